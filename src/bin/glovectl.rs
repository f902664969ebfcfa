//! Command-line front end for the FlexGlove link manager.

use std::{env, process::ExitCode, sync::Arc};

use log::info;
use tokio::signal;

use flexglove_ble::{BluezRadio, Config, GloveLink, Result};

#[tokio::main]
async fn main() -> ExitCode {
   env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

   let args: Vec<String> = env::args().skip(1).collect();
   let result = match args.first().map(String::as_str) {
      Some("scan") => scan(args.get(1)).await,
      Some("open") => open(args.get(1), args.get(2)).await,
      _ => {
         eprintln!("Usage: glovectl scan [duration-ms]");
         eprintln!("       glovectl open [name] [timeout-ms]");
         return ExitCode::FAILURE;
      },
   };

   match result {
      Ok(()) => ExitCode::SUCCESS,
      Err(e) => {
         eprintln!("Error: {e}");
         ExitCode::FAILURE
      },
   }
}

async fn build_link() -> Result<(GloveLink, Config)> {
   let config = Config::load()?;
   let radio = Arc::new(BluezRadio::new().await?);
   Ok((GloveLink::new(radio, config.clone()), config))
}

async fn scan(duration: Option<&String>) -> Result<()> {
   let duration_ms = duration.and_then(|d| d.parse().ok()).unwrap_or(0);
   let (link, _config) = build_link().await?;

   let names = link.scan_for_devices(duration_ms).await?;
   if names.is_empty() {
      println!("No named devices found");
   } else {
      for name in names {
         println!("{name}");
      }
   }
   Ok(())
}

async fn open(name: Option<&String>, timeout: Option<&String>) -> Result<()> {
   let (link, config) = build_link().await?;
   let name = name.cloned().unwrap_or(config.device_name);
   let timeout_ms = timeout.and_then(|t| t.parse().ok()).unwrap_or(0);

   let handle = link.open(&name, timeout_ms).await?;
   info!("Session {handle} open; streaming frames (Ctrl-C to stop)");

   link
      .set_rx_listener(Arc::new(|data: &[u8]| {
         println!("{}", hex::encode(data));
      }))
      .await;

   signal::ctrl_c().await?;
   link.close(handle).await;
   Ok(())
}
