use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("delugemux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: delugemux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("DELUGEMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!(
        "build_profile: {}",
        option_env!("DELUGEMUX_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_port: {}", delugemux_transport::DEFAULT_PORT);
    println!(
        "max_frame_size: {}",
        delugemux_frame::DEFAULT_MAX_FRAME_SIZE
    );
    println!("features: rpc={}, cli=true", cfg!(feature = "rpc"));

    Ok(SUCCESS)
}
