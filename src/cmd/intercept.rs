use anyhow::{bail, Result};

use embedres::{Config, Resolver};

use super::output::print_result;

pub async fn cmd_intercept(config: &Config, url: &str, json: bool) -> Result<()> {
    let resolver = Resolver::from_config(config)?;

    eprintln!("🌐 Rendering {url}");
    match resolver.intercept_only(url).await? {
        Some(result) => print_result(&result, json),
        None => bail!("No manifest request observed on {url}"),
    }
}
