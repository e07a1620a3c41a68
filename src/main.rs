mod char_edit;
mod config;
mod error;
mod fs;
mod helper;
mod line_edit;
mod position;
mod protocol;
mod sandbox;
mod server;
mod structure;
mod tools;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
	let config = config::load_config()?;
	server::init_tracing(&config);
	let result = server::run(config).await;
	opentelemetry::global::shutdown_tracer_provider();
	result
}
