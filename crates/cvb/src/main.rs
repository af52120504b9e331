use std::sync::Arc;

use cvb_core::{config::Config, corpus::CorpusStore, supervisor::JobSupervisor};
use cvb_fetcher::FetcherRunner;

#[tokio::main]
async fn main() -> Result<(), cvb_core::Error> {
    cvb_core::logging::init("cvb")?;

    let cfg = Arc::new(Config::load()?);
    let store = Arc::new(CorpusStore::open(&cfg.corpus_dir).await?);
    let supervisor = Arc::new(JobSupervisor::new(Arc::new(FetcherRunner)));

    cvb_telegram::router::run_polling(cfg, store, supervisor)
        .await
        .map_err(|e| cvb_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
