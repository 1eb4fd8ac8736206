use anyhow::Result;
use replybook::cli::App;

#[tokio::main]
async fn main() -> Result<()> {
    let (mut app, args) = App::from_args()?;

    app.run(args).await?;

    Ok(())
}
