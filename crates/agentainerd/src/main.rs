use agentainerd::runtime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let state = runtime::boot().await?;
    runtime::serve(state).await
}
