use channelsync_core::{Error, ErrorCode, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to a canonical entity during the scan mapping phase.
///
/// Platform payloads are translated to canonical drafts before anything is
/// persisted, so drafts cross-link with temporary string ids derived from
/// the platform ids. The store only accepts `Uuid`s; a temporary id must be
/// resolved through [`EntityRef::require_real`] first, which makes leaking
/// one into persistence a type error rather than a data bug.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRef {
    Real(Uuid),
    Temp(String),
}

impl EntityRef {
    /// Temporary product reference: `temp-product-<platformId>`.
    pub fn temp_product(platform_id: &str) -> Self {
        Self::Temp(format!("temp-product-{}", platform_id))
    }

    /// Temporary variant reference: `temp-variant-<platformId>`.
    pub fn temp_variant(platform_id: &str) -> Self {
        Self::Temp(format!("temp-variant-{}", platform_id))
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Self::Temp(_))
    }

    pub fn as_real(&self) -> Option<Uuid> {
        match self {
            Self::Real(id) => Some(*id),
            Self::Temp(_) => None,
        }
    }

    /// The real id, or an error naming the unresolved temporary key.
    pub fn require_real(&self) -> Result<Uuid> {
        match self {
            Self::Real(id) => Ok(*id),
            Self::Temp(key) => Err(Error::new(
                ErrorCode::InvalidInput,
                format!("temporary id {} reached a persistence boundary", key),
            )),
        }
    }
}

impl From<Uuid> for EntityRef {
    fn from(id: Uuid) -> Self {
        Self::Real(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_refs_carry_the_platform_id() {
        let product = EntityRef::temp_product("gid-123");
        let variant = EntityRef::temp_variant("44");

        assert_eq!(product, EntityRef::Temp("temp-product-gid-123".into()));
        assert_eq!(variant, EntityRef::Temp("temp-variant-44".into()));
        assert!(product.is_temp());
        assert!(product.as_real().is_none());
    }

    #[test]
    fn temp_refs_refuse_persistence() {
        let temp = EntityRef::temp_variant("44");
        assert!(temp.require_real().is_err());

        let id = Uuid::new_v4();
        assert_eq!(EntityRef::Real(id).require_real().unwrap(), id);
    }
}
