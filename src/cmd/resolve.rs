use anyhow::Result;

use embedres::{Config, ResolutionReference, Resolver};

use super::output::print_result;

pub async fn cmd_resolve(
    config: &Config,
    provider: &str,
    target: &str,
    api_key: Option<String>,
    json: bool,
) -> Result<()> {
    let resolver = Resolver::from_config(config)?;

    let mut reference = ResolutionReference::new(provider, target);
    if let Some(key) = api_key {
        reference = reference.with_api_key(key);
    }

    eprintln!("📡 Resolving {target} via {provider}");
    let result = resolver.resolve(&reference).await?;
    print_result(&result, json)
}
