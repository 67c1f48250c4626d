use embedres::Config;

pub fn cmd_providers(config: &Config) {
    if config.providers.is_empty() {
        println!("No providers configured ({})", embedres::config::default_path().display());
        return;
    }

    for provider in &config.providers {
        let key = match provider.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => mask(key),
            _ => "-".to_string(),
        };
        println!(
            "{:<16} {:<10} {:<40} key={key}",
            provider.id,
            format!("{:?}", provider.kind).to_lowercase(),
            provider.base_url,
        );
    }
}

/// Show only the last four characters of a secret.
fn mask(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
