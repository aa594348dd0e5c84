mod cli;
mod file_renderer;
mod sine_renderer;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = cli::CliArgs::parse(std::env::args())?;
    cli::run(args)
}
