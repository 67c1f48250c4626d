use anyhow::Result;

use embedres::ResolutionResult;

/// Print a result either as JSON or as a short human-readable block.
pub fn print_result(result: &ResolutionResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.url);
    eprintln!("🎬 Strategy: {}", result.strategy);

    let mut headers: Vec<_> = result.headers.iter().collect();
    headers.sort();
    for (name, value) in headers {
        eprintln!("   {name}: {value}");
    }
    Ok(())
}
