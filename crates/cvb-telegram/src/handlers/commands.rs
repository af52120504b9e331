use std::{path::Path, sync::Arc, time::Duration};

use teloxide::prelude::*;

use cvb_core::{
    corpus::{rename_with_retry, MergeOutcome},
    domain::ChatId,
    errors::Error,
    messaging::types::{transfer_route, TransferRoute},
    query::{search, QueryOptions, SearchOutcome},
    security::{single_line_argument, ARGUMENT_REQUIRED_REPLY},
    supervisor::{JobOutcome, JobRequest},
    utils::{
        capitalize, format_elapsed, generate_password, human_timestamp, truncate_with_ellipsis,
    },
    worker::JobSpec,
    Result,
};

use crate::router::AppState;

/// Pause between chunked replies so the transport's per-chat budget holds.
const CHUNK_SEND_DELAY: Duration = Duration::from_millis(300);
/// Ceiling for inline command output (shell output, listings, stderr).
const REPLY_TEXT_LIMIT: usize = 3500;

const FILE_NOT_FOUND_REPLY: &str = "File not found, use /ls to see all files.";

pub fn parse_command(text: &str) -> (String, String) {
    // The transport may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

pub async fn handle_command(
    msg: Message,
    state: Arc<AppState>,
    cmd: &str,
    rest: &str,
) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);

    let outcome = match cmd {
        "start" => start_command(&state, chat_id).await,
        "help" | "h" => help_command(&state, chat_id).await,
        "find" | "f" => find_command(&state, chat_id, rest, false).await,
        "findraw" | "fr" => find_command(&state, chat_id, rest, true).await,
        "download" | "dl" => download_command(&state, chat_id, rest).await,
        "downloadfile" | "dlf" => download_file_command(&state, chat_id, rest).await,
        "downloadall" | "dla" => download_all_command(&state, chat_id).await,
        "update" | "up" => merge_command(&state, chat_id).await,
        "ls" => list_command(&state, chat_id).await,
        "remove" | "rm" => remove_command(&state, chat_id, rest).await,
        "rename" | "rn" => rename_command(&state, chat_id, rest).await,
        "execute" | "exec" => execute_command(&state, chat_id, rest).await,
        "password" | "pass" => password_command(&state, chat_id, rest).await,
        "getatt" => attachments_command(&state, chat_id, rest).await,
        "cancel" => cancel_command(&state, chat_id).await,
        "monitor" => monitor_command(&state, chat_id, rest).await,
        "keywords" | "kw" => keywords_command(&state, chat_id, rest).await,
        _ => unknown_command(&state, chat_id).await,
    };

    // The core raises typed failures; render them once, here.
    if let Err(e) = outcome {
        let _ = state.messenger.send(chat_id, &format!("Error: {e}")).await;
    }
    Ok(())
}

async fn start_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    state
        .messenger
        .send(
            chat_id,
            "Combo vault bot online.\nUse /help to see the available commands.",
        )
        .await?;
    Ok(())
}

async fn help_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    let command_list: &[(&str, &str, &str)] = &[
        ("/start", "", "Start the bot and get a welcome message."),
        ("/help or /h", "", "Display all available commands and their usage."),
        (
            "/find or /f [query] [max]",
            "-> Specify a search query",
            "Search the combined corpus and display matches in Username/Password format.",
        ),
        (
            "/findraw or /fr [query] [max]",
            "-> Specify a search query",
            "Search the combined corpus and display matches in raw format.",
        ),
        (
            "/download or /dl [query] (-nu)",
            "-> Specify a search query",
            "Run the fetch worker for a query and upload the resulting file.",
        ),
        (
            "/downloadfile or /dlf [file_name]",
            "-> Specify a file name",
            "Download a specific file from the server.",
        ),
        ("/downloadall or /dla", "", "Download the combined corpus as a file."),
        ("/update or /up", "", "Combine all text files into the merged corpus."),
        ("/ls", "", "List all files in the corpus directory."),
        ("/remove or /rm [file_name]", "-> Specify a file name", "Delete a specific file."),
        (
            "/rename or /rn [file_name new_name] or [all|all prefix]",
            "-> Specify a file name",
            "Rename a specific file, or all files to a numbered sequence.",
        ),
        ("/execute or /exec [command]", "-> Specify system command", "Execute a system command."),
        (
            "/password or /pass [length] (-s)",
            "-> Specify pass length",
            "Generate a random password; -s skips special characters.",
        ),
        (
            "/getatt [channel_id and/or limit]",
            "-> Specify channel id and/or limit",
            "Download attachments from the given channel id.",
        ),
        ("/cancel", "", "Cancel the running fetch job."),
        ("/monitor [on|off]", "", "Toggle keyword capture for plain messages."),
        ("/keywords or /kw [add|del word]", "", "Manage the saved keyword list."),
    ];

    let mut help_text = String::from("Available commands:\n\n");
    for (command, arguments, usage) in command_list {
        if arguments.is_empty() {
            help_text.push_str(&format!("{command}\n{usage}\n\n"));
        } else {
            help_text.push_str(&format!("{command} {arguments}\n{usage}\n\n"));
        }
    }

    state.messenger.send(chat_id, &help_text).await?;
    Ok(())
}

async fn find_command(
    state: &AppState,
    chat_id: ChatId,
    rest: &str,
    raw_mode: bool,
) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };
    let mut parts = arg.split_whitespace();
    let query = parts.next().unwrap_or_default().to_string();
    let max_results = parts.next().and_then(|s| s.parse::<usize>().ok());

    let source = match state.store.get(&state.cfg.merged_source).await {
        Ok(s) => s,
        Err(Error::NotFound(_)) => {
            state
                .messenger
                .send(
                    chat_id,
                    &format!(
                        "No combined corpus yet. Use /update to build {}.txt first.",
                        state.cfg.merged_source
                    ),
                )
                .await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    state
        .messenger
        .send(chat_id, "Search is being processed, please wait...")
        .await?;

    let options = QueryOptions {
        max_results,
        shuffle: true,
        raw_mode,
    };
    match search(source, &query, options) {
        SearchOutcome::NoMatches => {
            state.messenger.send(chat_id, "No credentials found.").await?;
        }
        SearchOutcome::Found(stream) => {
            let raw = stream.raw_mode();
            for chunk in stream {
                let message = format!(
                    "Found {} accounts [{}]:\n{}",
                    capitalize(&query),
                    chunk.len(),
                    chunk.render(raw)
                );
                state.messenger.send(chat_id, &message).await?;
                tokio::time::sleep(CHUNK_SEND_DELAY).await;
            }
        }
    }
    Ok(())
}

async fn download_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };
    let mut parts = arg.split_whitespace();
    let query = parts.next().unwrap_or_default().to_string();
    let no_upload = parts.next() == Some("-nu");

    // The worker stages its output in a scratch dir; the result is promoted
    // to the canonical name only after a clean finish.
    let scratch = state.cfg.corpus_dir.join(".fetch");
    std::fs::create_dir_all(&scratch)?;
    let staged = scratch.join(format!("{query}.txt"));
    let _ = std::fs::remove_file(&staged);

    state
        .messenger
        .send(chat_id, "This may take a while, please wait...")
        .await?;
    let started_at = human_timestamp();

    let request = JobRequest {
        spec: JobSpec {
            program: state.cfg.fetcher_path.clone(),
            args: vec![query.clone(), scratch.display().to_string()],
            cwd: state.cfg.corpus_dir.clone(),
        },
        output_path: Some(staged.clone()),
    };

    let report = state
        .supervisor
        .run(request, chat_id, state.messenger.clone())
        .await?;

    match report.outcome {
        JobOutcome::Succeeded => {
            let canonical = state.store.path_for(&query);
            // rename(2) replaces an existing target on unix but not on
            // Windows; clear the stale copy first.
            let _ = std::fs::remove_file(&canonical);
            rename_with_retry(
                &staged,
                &canonical,
                state.cfg.rename_retries,
                state.cfg.rename_retry_delay,
            )
            .await?;
            state.store.ingest(&query, &canonical).await?;

            state
                .messenger
                .send(
                    chat_id,
                    &format!(
                        "Done. {started_at} -> {} ({})",
                        human_timestamp(),
                        format_elapsed(report.elapsed)
                    ),
                )
                .await?;

            if no_upload {
                state
                    .messenger
                    .send(chat_id, "File will not be uploaded.")
                    .await?;
            } else {
                send_corpus_file(
                    state,
                    chat_id,
                    &canonical,
                    &format!("{query}.txt"),
                    &format!("Download all found credentials for {}", capitalize(&query)),
                )
                .await?;
            }
        }
        JobOutcome::EmptyOutput => {
            state
                .messenger
                .send(chat_id, "File is empty. No credentials found.")
                .await?;
        }
        JobOutcome::Cancelled => {
            state.messenger.send(chat_id, "Download cancelled.").await?;
        }
        JobOutcome::Failed { code, stderr } => {
            state
                .messenger
                .send(chat_id, &render_failure(code, &stderr))
                .await?;
        }
    }
    Ok(())
}

async fn download_file_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };
    if arg.contains('/') || arg.contains('\\') {
        state.messenger.send(chat_id, FILE_NOT_FOUND_REPLY).await?;
        return Ok(());
    }

    let path = state.cfg.corpus_dir.join(&arg);
    if !path.exists() {
        state.messenger.send(chat_id, FILE_NOT_FOUND_REPLY).await?;
        return Ok(());
    }

    send_corpus_file(
        state,
        chat_id,
        &path,
        &arg,
        &format!("Download file {arg} from server"),
    )
    .await
}

async fn download_all_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    let path = state.store.path_for(&state.cfg.merged_source);
    if !path.exists() {
        state
            .messenger
            .send(
                chat_id,
                &format!(
                    "No combined corpus yet. Use /update to build {}.txt first.",
                    state.cfg.merged_source
                ),
            )
            .await?;
        return Ok(());
    }

    send_corpus_file(
        state,
        chat_id,
        &path,
        &format!("{}.txt", state.cfg.merged_source),
        "Download all credentials.",
    )
    .await
}

async fn merge_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    let names = state.store.list().await;
    if names.is_empty() {
        state.messenger.send(chat_id, "No files yet.").await?;
        return Ok(());
    }

    match state
        .store
        .merge_all(&names, &state.cfg.merged_source)
        .await?
    {
        MergeOutcome::Merged { name, lines } => {
            state
                .messenger
                .send(
                    chat_id,
                    &format!("All text files combined into {name}.txt ({lines} unique lines)."),
                )
                .await?;
        }
        MergeOutcome::AllEmpty => {
            state
                .messenger
                .send(chat_id, "All text files are empty.")
                .await?;
        }
    }
    Ok(())
}

async fn list_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    let names = state.store.list().await;
    let reply = if names.is_empty() {
        "No files yet.".to_string()
    } else {
        let listing = names
            .iter()
            .map(|n| format!("{n}.txt"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Files in corpus directory:\n{}",
            truncate_with_ellipsis(&listing, REPLY_TEXT_LIMIT)
        )
    };
    state.messenger.send(chat_id, &reply).await?;
    Ok(())
}

async fn remove_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };

    let name = strip_txt(&arg);
    match state.store.delete(name).await {
        Ok(()) => {
            state
                .messenger
                .send(chat_id, &format!("File '{name}.txt' has been deleted."))
                .await?;
        }
        Err(Error::NotFound(_)) => {
            state.messenger.send(chat_id, FILE_NOT_FOUND_REPLY).await?;
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

async fn rename_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };

    let tokens: Vec<&str> = arg.split_whitespace().collect();
    match tokens.as_slice() {
        &["all"] => bulk_rename(state, chat_id, "combo").await,
        &["all", prefix] => bulk_rename(state, chat_id, prefix).await,
        &[old, new] => {
            let old = strip_txt(old);
            let new = strip_txt(new);
            match state.store.rename(old, new).await {
                Ok(()) => {
                    state
                        .messenger
                        .send(chat_id, &format!("{old}.txt just got renamed to {new}.txt"))
                        .await?;
                }
                Err(Error::NotFound(_)) => {
                    state
                        .messenger
                        .send(chat_id, &format!("Error: {old}.txt doesn't exist."))
                        .await?;
                }
                Err(Error::Conflict(_)) => {
                    state
                        .messenger
                        .send(chat_id, &format!("Error: {new}.txt already exists."))
                        .await?;
                }
                Err(e) => return Err(e),
            }
            Ok(())
        }
        _ => {
            state
                .messenger
                .send(chat_id, "Unknown argument or invalid file name, use /help.")
                .await?;
            Ok(())
        }
    }
}

async fn bulk_rename(state: &AppState, chat_id: ChatId, prefix: &str) -> Result<()> {
    let renamed = state.store.rename_all_sequenced(prefix).await?;
    state
        .messenger
        .send(
            chat_id,
            &format!(
                "All txt files have been renamed {prefix}#.txt ({} files).",
                renamed.len()
            ),
        )
        .await?;
    Ok(())
}

async fn execute_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let Some(arg) = single_line_argument(rest) else {
        state.messenger.send(chat_id, ARGUMENT_REQUIRED_REPLY).await?;
        return Ok(());
    };

    #[cfg(unix)]
    let output = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&arg)
        .output()
        .await?;
    #[cfg(windows)]
    let output = tokio::process::Command::new("cmd")
        .arg("/C")
        .arg(&arg)
        .output()
        .await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stdout.trim().is_empty() {
        state
            .messenger
            .send(
                chat_id,
                &format!("{arg}:\n{}", truncate_with_ellipsis(&stdout, REPLY_TEXT_LIMIT)),
            )
            .await?;
    }
    if !stderr.trim().is_empty() {
        state
            .messenger
            .send(
                chat_id,
                &format!("Error!\n{}", truncate_with_ellipsis(&stderr, REPLY_TEXT_LIMIT)),
            )
            .await?;
    }
    if stdout.trim().is_empty() && stderr.trim().is_empty() {
        state.messenger.send(chat_id, "No output received.").await?;
    }
    Ok(())
}

async fn password_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let (length, include_special) = parse_password_args(rest);
    let password = generate_password(length, include_special);
    state.messenger.send(chat_id, &password).await?;
    Ok(())
}

async fn attachments_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let (channel_id, limit) = parse_attachment_args(rest, state.channel.load());
    state.channel.save(channel_id)?;

    state
        .messenger
        .send(
            chat_id,
            &format!("Spawning worker to download attachments from \"{channel_id}\""),
        )
        .await?;

    let request = JobRequest {
        spec: JobSpec {
            program: state.cfg.attachment_fetcher_path.clone(),
            args: vec![
                channel_id.to_string(),
                limit.to_string(),
                state.cfg.corpus_dir.display().to_string(),
            ],
            cwd: state.cfg.corpus_dir.clone(),
        },
        output_path: None,
    };

    let report = state
        .supervisor
        .run(request, chat_id, state.messenger.clone())
        .await?;

    match report.outcome {
        JobOutcome::Succeeded => {
            state
                .messenger
                .send(
                    chat_id,
                    &format!("Done! ({})", format_elapsed(report.elapsed)),
                )
                .await?;
        }
        JobOutcome::EmptyOutput => {
            state
                .messenger
                .send(chat_id, "No attachments retrieved.")
                .await?;
        }
        JobOutcome::Cancelled => {
            state.messenger.send(chat_id, "Download cancelled.").await?;
        }
        JobOutcome::Failed { code, stderr } => {
            state
                .messenger
                .send(chat_id, &render_failure(code, &stderr))
                .await?;
        }
    }
    Ok(())
}

async fn cancel_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    let reply = if state.supervisor.cancel().await {
        "Cancellation requested; stopping the running worker."
    } else {
        "No job is running."
    };
    state.messenger.send(chat_id, reply).await?;
    Ok(())
}

async fn monitor_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let reply = match rest.trim() {
        "on" => {
            state.monitor.set_enabled(true);
            "Keyword capture enabled.".to_string()
        }
        "off" => {
            state.monitor.set_enabled(false);
            "Keyword capture disabled.".to_string()
        }
        "" => format!(
            "Keyword capture is {}.",
            if state.monitor.enabled() { "on" } else { "off" }
        ),
        _ => "Usage: /monitor on|off".to_string(),
    };
    state.messenger.send(chat_id, &reply).await?;
    Ok(())
}

async fn keywords_command(state: &AppState, chat_id: ChatId, rest: &str) -> Result<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let reply = match tokens.as_slice() {
        &[] => {
            let all = state.keywords.load();
            if all.is_empty() {
                "No keywords saved.".to_string()
            } else {
                format!("Saved keywords:\n{}", all.join("\n"))
            }
        }
        &["add", keyword] => {
            if state.keywords.add(keyword)? {
                format!("Keyword saved: {keyword}")
            } else {
                format!("Keyword already saved: {keyword}")
            }
        }
        &["del" | "remove", keyword] => {
            if state.keywords.remove(keyword)? {
                format!("Keyword removed: {keyword}")
            } else {
                format!("Keyword not found: {keyword}")
            }
        }
        _ => "Usage: /keywords [add|del word]".to_string(),
    };
    state.messenger.send(chat_id, &reply).await?;
    Ok(())
}

async fn unknown_command(state: &AppState, chat_id: ChatId) -> Result<()> {
    state
        .messenger
        .send(
            chat_id,
            "Sorry, I don't understand, use /help to check all commands",
        )
        .await?;
    Ok(())
}

async fn send_corpus_file(
    state: &AppState,
    chat_id: ChatId,
    path: &Path,
    display_name: &str,
    caption: &str,
) -> Result<()> {
    let size = std::fs::metadata(path)?.len();
    let route = transfer_route(size, state.cfg.large_transfer_threshold);
    let notice = match route {
        TransferRoute::Large => "File is large; sending via the large-file route, please wait...",
        TransferRoute::Small => "Uploading in progress...",
    };
    state.messenger.send(chat_id, notice).await?;
    state
        .messenger
        .send_file(chat_id, path, display_name, caption, route)
        .await
}

fn render_failure(code: Option<i32>, stderr: &str) -> String {
    if stderr.trim().is_empty() {
        match code {
            Some(c) => format!("Error: worker exited with code {c}"),
            None => "Error: worker exited abnormally".to_string(),
        }
    } else {
        format!("Error: {}", truncate_with_ellipsis(stderr.trim(), REPLY_TEXT_LIMIT))
    }
}

fn strip_txt(name: &str) -> &str {
    name.strip_suffix(".txt").unwrap_or(name)
}

fn parse_password_args(rest: &str) -> (usize, bool) {
    let mut length = 15usize;
    let mut include_special = true;
    for token in rest.split_whitespace() {
        if token == "-s" {
            include_special = false;
        } else if let Ok(n) = token.parse::<usize>() {
            length = n.clamp(1, 1024);
        }
    }
    (length, include_special)
}

fn parse_attachment_args(rest: &str, last_channel: i64) -> (i64, i64) {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut channel = last_channel;
    let mut limit = 100i64;
    match tokens.as_slice() {
        &[] => {}
        &[one] => {
            // A long numeric token is a channel id; a short one is a limit.
            if one.trim_start_matches('-').len() > 5 {
                channel = one.parse().unwrap_or(last_channel);
            } else {
                limit = one.parse().unwrap_or(100);
            }
        }
        &[first, second, ..] => {
            channel = first.parse().unwrap_or(last_channel);
            limit = second.parse().unwrap_or(100);
        }
    }
    (channel, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_command_strips_slash_and_bot_suffix() {
        assert_eq!(
            parse_command("/find@combovaultbot netflix 50"),
            ("find".to_string(), "netflix 50".to_string())
        );
        assert_eq!(parse_command("/LS"), ("ls".to_string(), String::new()));
        assert_eq!(
            parse_command("/rename all combo"),
            ("rename".to_string(), "all combo".to_string())
        );
    }

    #[test]
    fn password_args_accept_length_and_special_flag_in_any_order() {
        assert_eq!(parse_password_args(""), (15, true));
        assert_eq!(parse_password_args("50"), (50, true));
        assert_eq!(parse_password_args("-s 50"), (50, false));
        assert_eq!(parse_password_args("50 -s"), (50, false));
        assert_eq!(parse_password_args("-s"), (15, false));
    }

    #[test]
    fn attachment_args_distinguish_channel_ids_from_limits() {
        assert_eq!(parse_attachment_args("", -100123), (-100123, 100));
        assert_eq!(parse_attachment_args("25", -100123), (-100123, 25));
        assert_eq!(parse_attachment_args("-923987905 2", -100123), (-923987905, 2));
        assert_eq!(parse_attachment_args("-923987905", -100123), (-923987905, 100));
    }

    #[test]
    fn failures_render_stderr_verbatim_or_the_exit_code() {
        assert_eq!(
            render_failure(Some(137), ""),
            "Error: worker exited with code 137"
        );
        assert_eq!(render_failure(Some(1), "boom\n"), "Error: boom");
        assert_eq!(render_failure(None, ""), "Error: worker exited abnormally");
    }
}
