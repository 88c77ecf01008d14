use slidectl::{cli, logging};

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
