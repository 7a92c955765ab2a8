//! Serve command - JSON-lines effect channel on stdin/stdout.
//!
//! Each input line is one `ChannelMessage` (`effect_request` or
//! `confirmation_verdict`). A bare effect request object without a `type`
//! tag is accepted too. Output lines are `effect_response` and
//! `confirmation_required` messages, in completion order.

use std::sync::Arc;

use bulwark_policy::{
    ChannelMessage, ChannelPresenter, GateService, channel::DEFAULT_CHANNEL_BUFFER,
    decode_request,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::host::Host;

/// Parse one input line; undecodable requests become their denial.
pub(crate) fn parse_line(line: &str) -> ChannelMessage {
    if let Ok(message) = serde_json::from_str::<ChannelMessage>(line) {
        return message;
    }
    match decode_request(line) {
        Ok(request) => ChannelMessage::EffectRequest(request),
        Err(denial) => ChannelMessage::EffectResponse(denial),
    }
}

/// Run the channel until stdin closes and every in-flight request settles.
pub(crate) async fn run_serve(host: &Host) -> anyhow::Result<()> {
    let audit = host.audit_log()?;
    let (presenter, mut prompts) = ChannelPresenter::new();
    let gate = host.gate(audit, Arc::new(presenter))?;
    let (client, service) = GateService::spawn(gate, DEFAULT_CHANNEL_BUFFER);
    info!(workspace = %host.workspace_root().display(), "effect channel listening on stdin");

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ChannelMessage>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = out_rx.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable channel message");
                    continue;
                },
            };
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let prompt_tx = out_tx.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(prompt) = prompts.recv().await {
            if prompt_tx
                .send(ChannelMessage::ConfirmationRequired(prompt))
                .is_err()
            {
                break;
            }
        }
    });

    let mut inflight = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message = parse_line(line);
        if let ChannelMessage::EffectResponse(_) = message {
            // Undecodable input answered locally.
            let _ = out_tx.send(message);
            continue;
        }
        let client = client.clone();
        let tx = out_tx.clone();
        inflight.spawn(async move {
            match client.handle(message).await {
                Ok(Some(reply)) => {
                    let _ = tx.send(reply);
                },
                Ok(None) => {},
                Err(e) => warn!(error = %e, "channel message rejected"),
            }
        });
    }

    info!(in_flight = inflight.len(), "stdin closed, draining");
    while inflight.join_next().await.is_some() {}
    drop(client);
    service.await?;
    forwarder.abort();
    drop(out_tx);
    writer.await??;
    Ok(())
}
