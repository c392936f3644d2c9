use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpStream, tcp::OwnedWriteHalf},
    select,
};
use tracing::warn;

use crate::{
    cli::ClientArgs,
    frame::{Frame, FrameKind, read_frame, write_frame},
};

pub async fn run(args: ClientArgs) -> Result<()> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    write_frame(&mut writer, &Frame::register_client(&args.username))
        .await
        .context("failed to register username")?;
    write_frame(&mut writer, &Frame::client_list_request())
        .await
        .context("failed to request the roster")?;
    write_stdout(&format!("*** connected to {} as {}", args.server, args.username)).await?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut input = String::new();

    loop {
        input.clear();
        select! {
            inbound = read_frame(&mut reader) => {
                if !handle_inbound(inbound).await? {
                    break;
                }
            }
            bytes_read = stdin.read_line(&mut input) => {
                if !handle_stdin_input(bytes_read, &input, &args.username, &mut writer).await? {
                    break;
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shutdown client writer cleanly");
    }

    Ok(())
}

async fn handle_inbound(inbound: io::Result<Option<Frame>>) -> Result<bool> {
    match inbound? {
        Some(frame) => {
            render_frame(frame).await?;
            Ok(true)
        }
        None => {
            // A rejected (duplicate) username also surfaces here: the relay
            // closes the connection without a reply.
            write_stdout("*** server closed the connection").await?;
            Ok(false)
        }
    }
}

async fn handle_stdin_input(
    bytes_read: io::Result<usize>,
    input: &str,
    username: &str,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let bytes_read = bytes_read?;
    if bytes_read == 0 {
        return Ok(false);
    }

    let text = input.trim();
    if text.is_empty() {
        return Ok(true);
    }

    if text.eq_ignore_ascii_case("/quit") {
        write_stdout("*** leaving chat").await?;
        return Ok(false);
    }

    let Some((recipient, body)) = text.split_once(' ') else {
        write_stderr("!!! usage: <recipient> <message>").await?;
        return Ok(true);
    };

    write_frame(writer, &Frame::message(username, recipient, body.trim_start())).await?;
    Ok(true)
}

async fn render_frame(frame: Frame) -> io::Result<()> {
    match frame.kind() {
        Some(FrameKind::Message) => {
            if let Some((sender, recipient, body)) = frame.message_parts() {
                write_stdout(&format!("{sender} -> {recipient}: {body}")).await?;
            }
        }
        Some(FrameKind::ClientList) => {
            let mut names = frame.entries();
            names.sort_unstable();
            write_stdout(&format!("*** currently online: {}", names.join(", "))).await?;
        }
        // Everything else is relay-to-relay chatter.
        _ => {}
    }
    Ok(())
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(line.as_bytes()).await?;
    stderr.write_all(b"\n").await?;
    stderr.flush().await
}
