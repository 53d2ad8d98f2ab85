use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("datashare {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: datashare");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!("target: {}", env!("DATASHARE_BUILD_TARGET"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!(
        "max_payload_size: {}",
        datashare_frame::MessageConfig::default().max_payload_size
    );
    println!(
        "max_request_argument_size: {}",
        datashare_peer::MAX_REQUEST_ARGUMENT_SIZE
    );

    Ok(SUCCESS)
}
