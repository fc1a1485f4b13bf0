#[macro_use]
extern crate rocket;

mod entrypoints;

use std::sync::{atomic::AtomicBool, Arc};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use evergreeners_server::{
    config::{Env, ServerConfig},
    db, sync,
};

#[launch]
async fn rocket() -> _ {
    dotenv::dotenv().ok();

    let subscriber = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().pretty());
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let env = envy::from_env::<Env>().expect("Failed to load environment variables");
    let config = ServerConfig::from_env(&env).expect("Invalid server configuration");
    let running = Arc::new(AtomicBool::new(true));

    let span = tracing::info_span!("Starting Rocket");
    let _enter = span.enter();
    tracing::info!(
        "Day boundary at UTC{}, syncing every {:?}",
        config.day_boundary.offset(),
        config.sync_interval
    );

    rocket::build()
        .manage(config)
        .attach(db::stage())
        .attach(sync::stage(
            config.day_boundary,
            config.sync_interval,
            running,
        ))
        .attach(entrypoints::stage())
}
