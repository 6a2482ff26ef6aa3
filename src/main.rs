use log::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = m3u8_assembler::cli::parse_args();

    match (&args.url, &args.batch) {
        (_, Some(batch)) => info!("Running batch file {:?}", batch),
        (Some(url), None) => info!("URL: {}", url),
        (None, None) => {}
    }

    if let Err(e) = m3u8_assembler::run(args).await {
        error!("An error occurred: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
