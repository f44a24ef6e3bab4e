use clap::Args;
use scholar_dashboard::DashboardConfig;

use super::connect;

#[derive(Args)]
pub struct StatusCommand {
    /// Print one line per backend instead of JSON
    #[arg(long)]
    pub plain: bool,
}

impl StatusCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let rt = tokio::runtime::Runtime::new()?;

        rt.block_on(async {
            let config = DashboardConfig::from_env();
            let registry = connect(&config).await;
            let statuses = registry.status().await;
            registry.reset().await;

            if self.plain {
                for status in &statuses {
                    let state = match (status.open, status.live) {
                        (true, true) => "connected",
                        (true, false) => "stale",
                        _ => "not connected",
                    };
                    println!("{:<10} {:<14} {}", status.kind.label(), state, status.endpoint);
                }
            } else {
                println!("{}", serde_json::to_string_pretty(&statuses)?);
            }

            Ok(())
        })
    }
}
