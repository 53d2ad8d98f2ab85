use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use datashare::memory::{Dataset, MemoryProvider};
use datashare_peer::Provider;
use tracing::info;

use crate::cmd::ServeArgs;
use crate::exit::{dataset_error, io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

pub fn run(args: ServeArgs) -> CliResult<i32> {
    let dataset = match &args.data {
        Some(path) => Dataset::load(path)
            .map_err(|err| dataset_error(&format!("failed loading {}", path.display()), err))?,
        None => Dataset::default(),
    };
    info!(
        tables = dataset.tables.len(),
        maps = dataset.maps.len(),
        "dataset loaded"
    );

    std::fs::create_dir_all(&args.dir).map_err(|err| {
        io_error(&format!("failed creating {}", args.dir.display()), err)
    })?;
    let mut provider = Provider::bind(&args.dir, &args.provider_id, MemoryProvider::new(dataset))
        .map_err(|err| peer_error("bind failed", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    install_ctrlc_handler(stop.clone())?;

    provider
        .run_until(&stop, POLL_INTERVAL)
        .map_err(|err| peer_error("provider failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
