use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use cvb_core::{
    config::Config,
    corpus::CorpusStore,
    messaging::port::MessagingPort,
    state::{ChannelStore, KeywordStore, MonitorState},
    supervisor::JobSupervisor,
};

use crate::{handlers, TelegramMessenger};

pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<CorpusStore>,
    pub supervisor: Arc<JobSupervisor>,
    pub messenger: Arc<dyn MessagingPort>,
    pub channel: ChannelStore,
    pub keywords: KeywordStore,
    pub monitor: MonitorState,
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<CorpusStore>,
    supervisor: Arc<JobSupervisor>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!("cvb started: @{}", me.username());
    }
    let sources = store.list().await.len();
    tracing::info!(corpus_dir = %cfg.corpus_dir.display(), sources, "serving corpus");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));

    let state = Arc::new(AppState {
        channel: ChannelStore::new(cfg.channel_id_file.clone(), cfg.default_channel_id),
        keywords: KeywordStore::new(cfg.keywords_file.clone()),
        monitor: MonitorState::default(),
        cfg,
        store,
        supervisor,
        messenger,
    });

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
