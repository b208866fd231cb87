//! The name registry: controller identifiers to running-graph names.
//!
//! Controllers never name nodes of the merged graph directly. Every
//! identifier is a three-letter prefix, an underscore, and an actual name:
//!
//! - `new_X` -- introduced by the staged program; resolves through the
//!   registry, which a prior insert must have populated.
//! - `old_X` -- already present in the running program; resolves to `X`
//!   directly, bypassing the registry.
//! - `flx_X` -- a flex node minted during this reconfiguration session;
//!   resolves through the registry.
//! - the literal `null` -- the empty edge.
//!
//! The registry lives for one reconfiguration session and is cleared when
//! the next staged program is initialized.

use std::collections::HashMap;

use crate::error::ReconfigError;

/// The identifier spelling the null edge.
pub const NULL_ID: &str = "null";

const FLEX_MOUNT_PREFIX: &str = "flex_func_mount_point_number_";

/// The recognized identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    New,
    Old,
    Flx,
}

/// Splits `id` into its prefix and actual name.
///
/// The grammar is strict: exactly three prefix letters, one underscore, and
/// a non-empty remainder. Anything else is a prefix error.
pub fn split_id(id: &str) -> Result<(IdPrefix, &str), ReconfigError> {
    let bytes = id.as_bytes();
    if bytes.len() < 5 || bytes[3] != b'_' {
        return Err(prefix_error(id));
    }
    let prefix = match &bytes[..3] {
        b"new" => IdPrefix::New,
        b"old" => IdPrefix::Old,
        b"flx" => IdPrefix::Flx,
        _ => return Err(prefix_error(id)),
    };
    Ok((prefix, &id[4..]))
}

fn prefix_error(id: &str) -> ReconfigError {
    tracing::error!(id, "identifier prefix has no match");
    ReconfigError::Prefix { id: id.to_string() }
}

/// Parses the mount-point number out of a flex node's actual name.
///
/// Names of the form `flex_func_mount_point_number_$N$` carry the mount slot
/// `N`; a negative `N` is rejected. Every other spelling, including a
/// `$...$` section that does not follow the pattern or holds a non-numeric
/// field, is an anonymous flex node.
pub fn flex_mount_point(actual_name: &str) -> Result<Option<u32>, ReconfigError> {
    let (Some(first), Some(last)) = (actual_name.find('$'), actual_name.rfind('$')) else {
        return Ok(None);
    };
    if first == last || &actual_name[..first] != FLEX_MOUNT_PREFIX {
        return Ok(None);
    }
    match actual_name[first + 1..last].parse::<i64>() {
        Ok(number) if number < 0 => {
            tracing::error!(actual_name, number, "invalid flex mount point number");
            Err(ReconfigError::InvalidCommand {
                reason: format!("negative flex mount point number {number} in '{actual_name}'"),
            })
        }
        Ok(number) => Ok(Some(number as u32)),
        Err(_) => Ok(None),
    }
}

/// Per-session mapping from controller identifier to running-graph name.
#[derive(Debug, Default)]
pub struct NameRegistry {
    ids: HashMap<String, String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        NameRegistry::default()
    }

    /// Resolves one identifier to a running-graph name, `None` for `null`.
    pub fn resolve(&self, id: &str) -> Result<Option<String>, ReconfigError> {
        if id == NULL_ID {
            return Ok(None);
        }
        let (prefix, actual_name) = split_id(id)?;
        match prefix {
            IdPrefix::New | IdPrefix::Flx => match self.ids.get(id) {
                Some(name) => Ok(Some(name.clone())),
                None => {
                    tracing::error!(id, "cannot find the id in the registry");
                    Err(ReconfigError::UnknownId { id: id.to_string() })
                }
            },
            IdPrefix::Old => Ok(Some(actual_name.to_string())),
        }
    }

    /// Fails if `id` is already a registry key.
    pub fn dup_check(&self, id: &str) -> Result<(), ReconfigError> {
        if self.ids.contains_key(id) {
            tracing::error!(id, "duplicated id in the registry");
            return Err(ReconfigError::DuplicateId { id: id.to_string() });
        }
        Ok(())
    }

    /// Records `id -> name`. Callers run [`dup_check`](Self::dup_check) first.
    pub fn bind(&mut self, id: impl Into<String>, name: impl Into<String>) {
        self.ids.insert(id.into(), name.into());
    }

    /// Drops the binding for `id`.
    pub fn unbind(&mut self, id: &str) -> Result<(), ReconfigError> {
        match self.ids.remove(id) {
            Some(_) => Ok(()),
            None => {
                tracing::error!(id, "cannot delete id from the registry");
                Err(ReconfigError::UnknownId { id: id.to_string() })
            }
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Registered `(id, name)` pairs, for consistency checks.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.ids.iter().map(|(id, name)| (id.as_str(), name.as_str()))
    }

    /// Starts a fresh session.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_id_accepts_the_three_prefixes() {
        assert_eq!(split_id("new_acl").unwrap(), (IdPrefix::New, "acl"));
        assert_eq!(split_id("old_acl").unwrap(), (IdPrefix::Old, "acl"));
        assert_eq!(split_id("flx_cut").unwrap(), (IdPrefix::Flx, "cut"));
    }

    #[test]
    fn split_id_rejects_everything_else() {
        for id in ["bad_x", "newx", "new", "", "n_x", "NEW_x", "new_"] {
            assert!(
                matches!(split_id(id), Err(ReconfigError::Prefix { .. })),
                "{id:?} should be a prefix error"
            );
        }
    }

    #[test]
    fn resolve_null_is_the_empty_edge() {
        let registry = NameRegistry::new();
        assert_eq!(registry.resolve("null").unwrap(), None);
    }

    #[test]
    fn resolve_old_bypasses_the_registry() {
        let registry = NameRegistry::new();
        assert_eq!(
            registry.resolve("old_MyIngress.acl").unwrap(),
            Some("MyIngress.acl".to_string())
        );
    }

    #[test]
    fn resolve_new_requires_a_binding() {
        let mut registry = NameRegistry::new();
        assert!(matches!(
            registry.resolve("new_acl"),
            Err(ReconfigError::UnknownId { .. })
        ));

        registry.bind("new_acl", "acl");
        assert_eq!(registry.resolve("new_acl").unwrap(), Some("acl".to_string()));
    }

    #[test]
    fn dup_check_and_unbind() {
        let mut registry = NameRegistry::new();
        registry.dup_check("new_acl").unwrap();
        registry.bind("new_acl", "acl");
        assert!(matches!(
            registry.dup_check("new_acl"),
            Err(ReconfigError::DuplicateId { .. })
        ));

        registry.unbind("new_acl").unwrap();
        assert!(matches!(
            registry.unbind("new_acl"),
            Err(ReconfigError::UnknownId { .. })
        ));
    }

    #[test]
    fn mount_point_parses_the_dollar_field() {
        assert_eq!(
            flex_mount_point("flex_func_mount_point_number_$7$").unwrap(),
            Some(7)
        );
        assert_eq!(
            flex_mount_point("flex_func_mount_point_number_$0$tail").unwrap(),
            Some(0)
        );
    }

    #[test]
    fn mount_point_treats_non_matching_names_as_anonymous() {
        assert_eq!(flex_mount_point("cutover").unwrap(), None);
        assert_eq!(flex_mount_point("odd$name$here").unwrap(), None);
        assert_eq!(flex_mount_point("flex_func_mount_point_number_$x$").unwrap(), None);
        assert_eq!(flex_mount_point("flex_func_mount_point_number_$$").unwrap(), None);
        assert_eq!(flex_mount_point("one$dollar").unwrap(), None);
    }

    #[test]
    fn mount_point_rejects_negative_numbers() {
        assert!(matches!(
            flex_mount_point("flex_func_mount_point_number_$-3$"),
            Err(ReconfigError::InvalidCommand { .. })
        ));
    }
}
