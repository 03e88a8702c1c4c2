use anyhow::Result;

mod app;
mod logging;

fn main() -> Result<()> {
    let args = folder_flow::cli::parse();
    app::run(args)
}
