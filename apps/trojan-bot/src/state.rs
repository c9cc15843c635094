use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use trojan_ledger::LedgerService;

use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub service: LedgerService,
    /// `None` when no recorder is installed (tests).
    pub metrics: Option<PrometheusHandle>,
    pub config: Arc<Config>,
}

#[cfg(test)]
pub(crate) fn test_state(data_file: &std::path::Path) -> AppState {
    use trojan_ledger::AddressAllocator;

    let config = Config::from_lookup(|key| match key {
        "BOT_TOKEN" => Some("123:secret".into()),
        "USER_DATA_FILE" => Some(data_file.display().to_string()),
        _ => None,
    })
    .unwrap();
    let allocator = AddressAllocator::new(config.pool.clone(), config.policy);
    let service = LedgerService::open(&config.data_file, allocator);
    AppState {
        service,
        metrics: None,
        config: Arc::new(config),
    }
}
