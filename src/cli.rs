#[tokio::main]
async fn main() -> anyhow::Result<()> {
    daybook::Cli::run().await
}
