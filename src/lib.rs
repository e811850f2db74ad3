#[macro_use]
mod logging;

pub mod cli;
pub mod error;
pub mod io;
pub mod settings;
pub mod sim;

use std::sync::Arc;

use clap::Parser;

use crate::cli::{Launch, SimArgs};
use crate::error::{Result, SimError};
use crate::io::serial::{list_ports, SerialConfig, SerialTransport};
use crate::settings::SimSettings;
use crate::sim::{ReplaySpec, Simulator};

/// Process entry point. Only bootstrap failures are returned; once the
/// dispatcher is running, errors are logged and the simulator carries on.
pub fn run() -> Result<()> {
    // Prints usage to stderr and exits on bad arity
    let args = SimArgs::parse();

    if args.list_ports {
        for p in list_ports()? {
            println!(
                "{}\t{}\t{}",
                p.port_name,
                p.port_type,
                p.product.or(p.manufacturer).unwrap_or_default()
            );
        }
        return Ok(());
    }

    let launch = args.launch()?;
    let settings = SimSettings::load(args.config.as_deref())?;

    if let Some(dir) = &settings.log_dir {
        logging::init_file_logging(dir, &launch.sensor).map_err(SimError::Config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SimError::Config(format!("Failed to start runtime: {}", e)))?;

    runtime.block_on(serve(launch, settings, args.start))
}

async fn serve(launch: Launch, settings: SimSettings, start_now: bool) -> Result<()> {
    let transport = Arc::new(SerialTransport::open(SerialConfig::from_settings(
        &launch.port,
        launch.baud,
        &settings,
    ))?);

    let spec = ReplaySpec {
        sensor: launch.sensor.clone(),
        path: launch.file.clone(),
        encoding: launch.encoding,
    };
    let mut sim = Simulator::new(spec, transport.clone(), &settings);
    let _listener = transport.listen(sim.framer())?;

    if start_now || settings.start_on_launch {
        sim.context_mut().turn_on().await;
    }

    println!("Simulator starts");
    tlog!(
        "[setup] {} on {} at {} baud, replaying {} as {:?}",
        launch.sensor,
        launch.port,
        launch.baud,
        launch.file.display(),
        launch.encoding
    );

    // Runs until the port goes away and the listener drops its framer
    sim.into_dispatcher().run().await;
    tlog!("[setup] {} on {} shut down", launch.sensor, launch.port);
    Ok(())
}
