//! Security and health dashboard endpoints

use super::RequestSpec;
use super::typed::SafawiClient;
use crate::client::error::ClientError;
use crate::realtime::SnapshotSource;
use async_trait::async_trait;
use safawinet_core::types::DashboardData;

impl SafawiClient {
    /// Full security dashboard snapshot
    pub async fn security_dashboard(&self) -> Result<DashboardData, ClientError> {
        self.fetch(RequestSpec::get("/api/security/dashboard"))
            .await
    }

    /// System health aggregates
    pub async fn system_health(&self) -> Result<DashboardData, ClientError> {
        self.fetch(RequestSpec::get("/api/health/system")).await
    }
}

#[async_trait]
impl SnapshotSource for SafawiClient {
    async fn fetch_snapshot(&self) -> Result<DashboardData, ClientError> {
        self.security_dashboard().await
    }
}
