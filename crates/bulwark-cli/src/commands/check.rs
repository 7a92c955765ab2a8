//! Check command - run one effect request through the gate.

use std::sync::Arc;

use bulwark_core::ConfirmationPolicy;
use bulwark_policy::{
    ChannelPresenter, ConfirmationPrompt, EffectResponse, Submission, Verdict, decode_request,
    taxonomy,
};
use clap::ValueEnum;
use colored::Colorize;
use dialoguer::{Input, Select, theme::ColorfulTheme};
use tracing::{debug, warn};

use crate::host::Host;
use crate::theme::Theme;

/// A verdict given on the command line instead of interactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum VerdictArg {
    /// Approve using the effect's policy.
    Approve,
    /// Approve this request only.
    Once,
    /// Approve for the rest of the session.
    Session,
    /// Approve until revoked.
    Permanent,
    /// Deny.
    Deny,
}

impl VerdictArg {
    fn into_verdict(self) -> Verdict {
        match self {
            Self::Approve => Verdict::approve(),
            Self::Once => Verdict::approve_for(ConfirmationPolicy::Once),
            Self::Session => Verdict::approve_for(ConfirmationPolicy::Session),
            Self::Permanent => Verdict::approve_for(ConfirmationPolicy::Permanent),
            Self::Deny => Verdict::deny("denied on the command line"),
        }
    }
}

/// Decode a request, submit it, and settle any confirmation it needs.
pub(crate) async fn run_check(
    host: &Host,
    raw: &str,
    verdict: Option<VerdictArg>,
    json: bool,
) -> anyhow::Result<()> {
    let request = match decode_request(raw) {
        Ok(request) => request,
        Err(denial) => return print_response(&denial, json),
    };

    let audit = host.audit_log()?;
    let (presenter, mut prompts) = ChannelPresenter::new();
    let gate = host.gate(audit, Arc::new(presenter))?;

    let handle = match gate.submit(request) {
        Submission::Decided(response) => return print_response(&response, json),
        Submission::Pending(handle) => handle,
    };
    debug!(request_id = handle.request_id(), "awaiting confirmation");

    let wait = handle.wait();
    tokio::pin!(wait);
    loop {
        tokio::select! {
            response = &mut wait => return print_response(&response, json),
            Some(prompt) = prompts.recv() => {
                if !prompt.requires_confirmation {
                    continue;
                }
                if !json {
                    print_prompt(&prompt);
                }
                let chosen = match verdict {
                    Some(arg) => arg.into_verdict(),
                    None => {
                        let prompt = prompt.clone();
                        tokio::task::spawn_blocking(move || ask_verdict(&prompt)).await??
                    },
                };
                // The confirmation may have timed out while the reviewer was deciding.
                if let Err(e) = gate.resolve_confirmation(&prompt.request_id, chosen) {
                    warn!(request_id = %prompt.request_id, error = %e, "verdict not applied");
                }
            },
        }
    }
}

fn print_prompt(prompt: &ConfirmationPrompt) {
    println!("\n{}", Theme::separator());
    println!("{}", Theme::header("Confirmation Required"));
    println!("  {}", prompt.description);
    println!("{}", Theme::kv("Effect", prompt.request.effect_type.as_str()));
    println!("{}", Theme::kv("Target", &prompt.details));
    println!("{}", Theme::kv("Source", &prompt.request.actor()));
    println!("{}", Theme::kv("Risk", &Theme::risk(prompt.risk_score)));
    println!("{}", Theme::kv("Policy", prompt.policy.as_str()));
    println!("{}", Theme::separator());
}

/// Ask for a verdict, offering only the durations the effect permits.
fn ask_verdict(prompt: &ConfirmationPrompt) -> anyhow::Result<Verdict> {
    let theme = ColorfulTheme::default();
    let permitted = taxonomy::permitted_policies(prompt.request.effect_type);
    let durations: Vec<ConfirmationPolicy> = permitted
        .iter()
        .copied()
        .filter(|p| *p != ConfirmationPolicy::Never)
        .collect();

    let mut options: Vec<String> = durations
        .iter()
        .map(|p| match p {
            ConfirmationPolicy::Always => "Approve this request".to_string(),
            ConfirmationPolicy::Once => "Approve once".to_string(),
            ConfirmationPolicy::Session => "Approve for this session".to_string(),
            ConfirmationPolicy::Permanent => "Always approve this target".to_string(),
            ConfirmationPolicy::Never => p.to_string(),
        })
        .collect();
    options.push("Deny".to_string());

    let selection = Select::with_theme(&theme)
        .with_prompt("Decision")
        .items(&options)
        .default(0)
        .interact()?;

    if let Some(policy) = durations.get(selection) {
        return Ok(Verdict::approve_for(*policy));
    }

    let reason: String = Input::with_theme(&theme)
        .with_prompt("Reason (optional)")
        .allow_empty(true)
        .interact_text()?;
    Ok(if reason.trim().is_empty() {
        Verdict::deny("denied by reviewer")
    } else {
        Verdict::deny(reason)
    })
}

fn print_response(response: &EffectResponse, json: bool) -> anyhow::Result<()> {
    if json {
        return super::print_json(response);
    }

    if response.approved {
        let approval = response
            .approval_type
            .map_or_else(String::new, |p| format!(" ({p})"));
        println!("{}", Theme::success(&format!("Approved{approval}")));
        if let Some(expires) = &response.expires_at {
            println!("{}", Theme::kv("Expires", &expires.to_string()));
        }
    } else {
        let code = response
            .denial_code
            .map_or_else(|| "denied".to_string(), |c| c.to_string());
        println!("{}", Theme::error(&format!("Denied: {code}")));
        if let Some(reason) = &response.denial_reason {
            println!("{}", Theme::kv("Reason", reason));
        }
    }
    if response.modified_scope.is_some() {
        println!("  {}", "scope narrowed by policy".dimmed());
    }
    println!("{}", Theme::kv("Request", &response.request_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_args() {
        assert_eq!(VerdictArg::Approve.into_verdict(), Verdict::approve());
        assert_eq!(
            VerdictArg::Session.into_verdict().approval_type,
            Some(ConfirmationPolicy::Session)
        );
        let deny = VerdictArg::Deny.into_verdict();
        assert!(!deny.approved);
        assert!(deny.reason.is_some());
    }
}
