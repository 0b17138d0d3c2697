//! `orchestrator ask`: run the agent once and print the step trace.

use super::runs::format_step;
use orchestrator_agent::policy::AUTO;
use orchestrator_config::AppConfig;
use orchestrator_gateway::{RunRequest, build_state};

pub async fn run(
    config: AppConfig,
    goal: String,
    tools: Option<String>,
    model: Option<String>,
    max_iterations: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    if goal.trim().is_empty() {
        return Err("goal must not be empty".into());
    }
    if !config.has_api_key() {
        tracing::warn!("No LLM API key configured; requests will likely be rejected");
    }

    let state = build_state(&config).await?;
    let outcome = state
        .execute(RunRequest {
            goal,
            model,
            tools: parse_tools(tools.as_deref()),
            max_iterations,
        })
        .await?;

    println!("{} ({})", outcome.run.short_name(), outcome.run.id);
    for step in &outcome.run.steps {
        println!("{}", format_step(step));
    }
    println!();

    match outcome.answer {
        Ok(answer) => {
            println!("{answer}");
            Ok(())
        }
        Err(e) => Err(format!("Agent execution failed: {e}").into()),
    }
}

/// `None` means no tools, `auto` means all of them, otherwise a comma list.
fn parse_tools(flag: Option<&str>) -> Option<Vec<String>> {
    let flag = flag?;
    if flag.trim().eq_ignore_ascii_case(AUTO) {
        return Some(vec![AUTO.to_string()]);
    }
    Some(
        flag.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_flag_means_no_tools() {
        assert_eq!(parse_tools(None), None);
    }

    #[test]
    fn auto_flag() {
        assert_eq!(parse_tools(Some(" AUTO ")), Some(vec!["auto".to_string()]));
    }

    #[test]
    fn comma_list_is_trimmed() {
        assert_eq!(
            parse_tools(Some("calculator, web_search,,")),
            Some(vec!["calculator".to_string(), "web_search".to_string()])
        );
    }
}
