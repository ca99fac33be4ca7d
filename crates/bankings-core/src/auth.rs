use crate::error::ProvisioningError;

/// Static shared-secret check for the `Authorization` header.
///
/// Both sides are hashed with blake3 and the digests compared with
/// `blake3::Hash` equality, which runs in constant time.
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    expected: blake3::Hash,
}

impl AuthorizationGate {
    pub fn new(secret: impl AsRef<str>) -> Self {
        Self {
            expected: blake3::hash(secret.as_ref().as_bytes()),
        }
    }

    pub fn check(&self, presented: Option<&str>) -> Result<(), ProvisioningError> {
        let presented = presented.ok_or(ProvisioningError::Unauthorized)?;
        if blake3::hash(presented.as_bytes()) != self.expected {
            return Err(ProvisioningError::Unauthorized);
        }
        Ok(())
    }
}
