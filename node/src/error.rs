use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("ledger error: {0}")]
    Ledger(#[from] rota_ledger::LedgerError),

    #[error("network error: {0}")]
    Network(#[from] rota_network::NetworkError),

    #[error("protocol error: {0}")]
    Protocol(#[from] rota_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] rota_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] rota_store_lmdb::LmdbError),

    #[error("config error: {0}")]
    Config(String),

    #[error("node not started")]
    NotStarted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
