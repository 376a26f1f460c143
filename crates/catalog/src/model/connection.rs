use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Supported external commerce platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "platform_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    Shopify,
    Square,
    Clover,
}

impl PlatformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformType::Shopify => "shopify",
            PlatformType::Square => "square",
            PlatformType::Clover => "clover",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "shopify" => Some(PlatformType::Shopify),
            "square" => Some(PlatformType::Square),
            "clover" => Some(PlatformType::Clover),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a platform connection.
///
/// ```text
/// disconnected → connecting → scanning → needs_review → syncing → (disconnected|error)
///                            ↑                               ↓
///                            └──── reconciling ──────────────┘
///          error ──(operator action)──→ disconnected
/// ```
///
/// Only the scan/reconciliation processors, user actions and
/// webhook-triggered error flips drive these transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "connection_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Scanning,
    NeedsReview,
    Syncing,
    Reconciling,
    Error,
}

impl ConnectionStatus {
    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: ConnectionStatus) -> bool {
        use ConnectionStatus::*;
        // Any state may fail, and a user may always disconnect.
        if matches!(next, Error | Disconnected) {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Scanning)
                | (Scanning, NeedsReview)
                | (NeedsReview, Syncing)
                | (Syncing, Reconciling)
                | (Reconciling, NeedsReview)
        )
    }

    /// States during which outbound pushes must be refused at enqueue.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting | ConnectionStatus::Scanning | ConnectionStatus::Reconciling
        )
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Scanning => "scanning",
            ConnectionStatus::NeedsReview => "needs_review",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Reconciling => "reconciling",
            ConnectionStatus::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// A user's authorized link to one external platform account.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform_type: PlatformType,
    pub display_name: String,
    pub is_enabled: bool,
    pub status: ConnectionStatus,
    /// Opaque per-platform mapping. Recognized keys: `shop`, `merchantId`,
    /// `scanSummary`, `mappingSuggestions`, `lastReconciliationAt`.
    pub platform_specific_data: serde_json::Value,
    /// Vault-encrypted credential blob; decrypted per job.
    pub encrypted_credentials: String,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub last_sync_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformConnection {
    pub fn new(
        user_id: Uuid,
        platform_type: PlatformType,
        display_name: impl Into<String>,
        encrypted_credentials: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            platform_type,
            display_name: display_name.into(),
            is_enabled: false,
            status: ConnectionStatus::Disconnected,
            platform_specific_data: serde_json::json!({}),
            encrypted_credentials: encrypted_credentials.into(),
            last_sync_attempt_at: None,
            last_sync_success_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shop domain (Shopify) recorded at authorization time.
    pub fn shop_domain(&self) -> Option<&str> {
        self.platform_specific_data.get("shop").and_then(|v| v.as_str())
    }

    /// Merchant id (Square/Clover) recorded at authorization time.
    pub fn merchant_id(&self) -> Option<&str> {
        self.platform_specific_data
            .get("merchantId")
            .and_then(|v| v.as_str())
    }

    pub fn scan_summary(&self) -> Option<ScanSummary> {
        self.platform_specific_data
            .get("scanSummary")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Counts produced by the analyze step of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub count_products: u64,
    pub count_variants: u64,
    pub count_locations: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions_are_legal() {
        use ConnectionStatus::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(NeedsReview));
        assert!(NeedsReview.can_transition_to(Syncing));
        assert!(Syncing.can_transition_to(Reconciling));
        assert!(Reconciling.can_transition_to(NeedsReview));
    }

    #[test]
    fn error_and_disconnect_are_reachable_from_anywhere() {
        use ConnectionStatus::*;
        for state in [
            Disconnected,
            Connecting,
            Scanning,
            NeedsReview,
            Syncing,
            Reconciling,
            Error,
        ] {
            assert!(state.can_transition_to(Error));
            assert!(state.can_transition_to(Disconnected));
        }
    }

    #[test]
    fn shortcuts_are_rejected() {
        use ConnectionStatus::*;
        assert!(!Disconnected.can_transition_to(Scanning));
        assert!(!Scanning.can_transition_to(Syncing));
        assert!(!Error.can_transition_to(Syncing));
        assert!(!NeedsReview.can_transition_to(Reconciling));
    }

    #[test]
    fn busy_states_block_pushes() {
        use ConnectionStatus::*;
        assert!(Scanning.is_busy());
        assert!(Reconciling.is_busy());
        assert!(Connecting.is_busy());
        assert!(!Syncing.is_busy());
        assert!(!NeedsReview.is_busy());
    }

    #[test]
    fn platform_specific_data_accessors() {
        let mut conn = PlatformConnection::new(
            Uuid::new_v4(),
            PlatformType::Shopify,
            "My Shop",
            "ciphertext",
        );
        conn.platform_specific_data = serde_json::json!({
            "shop": "demo.myshopify.com",
            "scanSummary": {"countProducts": 2, "countVariants": 3, "countLocations": 2}
        });

        assert_eq!(conn.shop_domain(), Some("demo.myshopify.com"));
        assert_eq!(
            conn.scan_summary(),
            Some(ScanSummary {
                count_products: 2,
                count_variants: 3,
                count_locations: 2
            })
        );
    }
}
