mod hardware;
mod host;
mod sensors;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    host::run().await
}
