use crate::{AuthError, ValidatedPayload};

/// Requires `permission` to be granted by `payload`.
///
/// Matching is exact and case-sensitive; there are no wildcards or hierarchies.
pub fn require(payload: &ValidatedPayload, permission: &str) -> Result<(), AuthError> {
    let permissions = payload
        .permissions
        .as_ref()
        .ok_or(AuthError::PermissionsClaimMissing)?;

    if permissions.iter().any(|granted| granted == permission) {
        Ok(())
    } else {
        Err(AuthError::PermissionNotFound)
    }
}

#[cfg(test)]
mod test {
    use super::require;
    use crate::verify::{Audience, ValidatedPayload};
    use crate::AuthError;

    fn payload(permissions: Option<&[&str]>) -> ValidatedPayload {
        ValidatedPayload {
            issuer: "https://issuer.example/".to_string(),
            audience: Audience::Single("drinks".to_string()),
            expires_at: 0,
            subject: None,
            permissions: permissions.map(|permissions| permissions.iter().map(|p| p.to_string()).collect()),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_granted_permission() {
        let payload = payload(Some(&["get:drinks", "delete:drinks"]));
        assert_eq!(require(&payload, "delete:drinks"), Ok(()));
    }

    #[test]
    fn test_missing_permission() {
        let payload = payload(Some(&["get:drinks"]));
        assert_eq!(require(&payload, "delete:drinks"), Err(AuthError::PermissionNotFound));
        assert_eq!(require(&payload, "GET:drinks"), Err(AuthError::PermissionNotFound));
        assert_eq!(require(&payload, "get:*"), Err(AuthError::PermissionNotFound));
    }

    #[test]
    fn test_empty_and_absent_permission_claims_differ() {
        assert_eq!(
            require(&payload(Some(&[])), "get:drinks"),
            Err(AuthError::PermissionNotFound)
        );
        assert_eq!(
            require(&payload(None), "get:drinks"),
            Err(AuthError::PermissionsClaimMissing)
        );
    }
}
