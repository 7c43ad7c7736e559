//! Audit log endpoints

use super::RequestSpec;
use super::typed::SafawiClient;
use crate::client::error::ClientError;
use safawinet_core::audit::{AuditLogQuery, MAX_PAGE_SIZE};
use safawinet_core::types::{AuditLogEntry, AuditLogPage};

impl SafawiClient {
    /// One page of audit records matching `query`
    pub async fn audit_logs(&self, query: &AuditLogQuery) -> Result<AuditLogPage, ClientError> {
        let spec = RequestSpec::get("/api/audit-logs").query(query.to_query());
        self.fetch(spec).await
    }

    /// Every record matching `query`, following pagination up to `max_records`
    pub async fn audit_logs_all(
        &self,
        query: &AuditLogQuery,
        max_records: usize,
    ) -> Result<Vec<AuditLogEntry>, ClientError> {
        let mut query = query.clone().limit(MAX_PAGE_SIZE).page(query.page.unwrap_or(1));
        let mut entries = Vec::new();
        loop {
            let page = self.audit_logs(&query).await?;
            let has_next = page.pagination.has_next() && !page.logs.is_empty();
            entries.extend(page.logs);
            if !has_next || entries.len() >= max_records {
                break;
            }
            query = query.page(page.pagination.page + 1);
        }
        entries.truncate(max_records);
        Ok(entries)
    }
}
