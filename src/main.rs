mod error;
mod http_api;
mod ledger;
mod model;
mod mongo;
mod store;

use dotenvy::dotenv;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    mongo::init_mongo_from_env().await?;

    http_api::run_http_server().await?;

    Ok(())
}
