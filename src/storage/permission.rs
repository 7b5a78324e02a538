//! Group and read-only authorization for mountpoints.

use crate::error::VfsError;
use crate::storage::mounts::Mountpoint;
use crate::utils::session::Session;
use serde::Deserialize;
use std::collections::HashMap;

/// A mountpoint group requirement: either a bare group name applying to
/// every operation, or a map restricting specific operations.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum GroupRule {
    Named(String),
    Methods(HashMap<String, Vec<String>>),
}

fn matches(required: &[String], user_groups: &[String], strict: bool) -> bool {
    if required.is_empty() {
        return true;
    }
    if strict {
        required.iter().all(|g| user_groups.contains(g))
    } else {
        required.iter().any(|g| user_groups.contains(g))
    }
}

/// Validates the user's groups against the mountpoint rules for one
/// operation. `strict` requires every listed group; otherwise one match
/// suffices. An empty rule list always passes.
pub fn validate_groups(
    user_groups: &[String],
    method: &str,
    rules: &[GroupRule],
    strict: bool,
) -> bool {
    if rules.is_empty() {
        return true;
    }

    let named: Vec<String> = rules
        .iter()
        .filter_map(|r| match r {
            GroupRule::Named(g) => Some(g.clone()),
            GroupRule::Methods(_) => None,
        })
        .collect();

    let named_valid = matches(&named, user_groups, strict);

    let method_valid = rules
        .iter()
        .filter_map(|r| match r {
            GroupRule::Methods(map) => map.get(method),
            GroupRule::Named(_) => None,
        })
        .all(|required| matches(required, user_groups, strict));

    named_valid && method_valid
}

/// Runs the full pre-dispatch authorization: read-only enforcement first,
/// then group validation. Raised errors carry the operation and mountpoint
/// names for the client payload.
pub fn check_permission(
    session: &Session,
    method: &str,
    mount: &Mountpoint,
    write_intent: bool,
    strict: bool,
) -> Result<(), VfsError> {
    if write_intent && mount.attributes.read_only {
        return Err(VfsError::ReadOnly(mount.name.clone()));
    }

    if !validate_groups(&session.user.groups, method, &mount.attributes.groups, strict) {
        return Err(VfsError::PermissionDenied {
            method: method.to_string(),
            mount: mount.name.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mounts::{MountAttributes, MountConfig};
    use crate::utils::session::User;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn mount_with(attributes: MountAttributes) -> Mountpoint {
        Mountpoint::new(MountConfig {
            name: "osjs".into(),
            adapter: None,
            attributes,
        })
    }

    fn session_with(user_groups: &[&str]) -> Session {
        Session {
            user: User {
                username: "jest".into(),
                groups: groups(user_groups),
            },
        }
    }

    #[test]
    fn test_empty_rules_always_pass() {
        assert!(validate_groups(&groups(&[]), "readdir", &[], true));
        assert!(validate_groups(&groups(&["a"]), "readdir", &[], false));
    }

    #[test]
    fn test_named_rules_strict_vs_lenient() {
        let rules = vec![
            GroupRule::Named("a".into()),
            GroupRule::Named("b".into()),
        ];

        // User has only one of the two required groups
        assert!(!validate_groups(&groups(&["a"]), "readdir", &rules, true));
        assert!(validate_groups(&groups(&["a"]), "readdir", &rules, false));
        assert!(validate_groups(&groups(&["a", "b"]), "readdir", &rules, true));
    }

    #[test]
    fn test_method_rules_apply_to_matching_operation_only() {
        let mut map = HashMap::new();
        map.insert("readdir".to_string(), groups(&["admin"]));
        let rules = vec![GroupRule::Methods(map)];

        assert!(!validate_groups(&groups(&["user"]), "readdir", &rules, true));
        assert!(validate_groups(&groups(&["admin"]), "readdir", &rules, true));
        // Unrelated operation is unconstrained
        assert!(validate_groups(&groups(&["user"]), "stat", &rules, true));
    }

    #[test]
    fn test_read_only_blocks_write_intent() {
        let mount = mount_with(MountAttributes {
            read_only: true,
            ..Default::default()
        });
        let session = session_with(&[]);

        let err = check_permission(&session, "writefile", &mount, true, true).unwrap_err();
        assert!(matches!(err, VfsError::ReadOnly(ref name) if name == "osjs"));

        assert!(check_permission(&session, "readdir", &mount, false, true).is_ok());
    }

    #[test]
    fn test_group_mismatch_is_permission_denied() {
        let mount = mount_with(MountAttributes {
            groups: vec![GroupRule::Named("admin".into())],
            ..Default::default()
        });
        let session = session_with(&["user"]);

        let err = check_permission(&session, "readdir", &mount, false, true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Permission was denied for 'readdir' in 'osjs'"
        );
    }
}
