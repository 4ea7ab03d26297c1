use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Result;
use serde_json::json;

use rfmd_core::{AppConfig, DaemonClient, Frame};

/// Address a local client should dial for the configured listener
pub fn target_addr(config: &AppConfig) -> Result<SocketAddr> {
    let mut addr = config.listen_addr()?;
    if addr.ip().is_unspecified() {
        addr.set_ip(Ipv4Addr::LOCALHOST.into());
    }
    Ok(addr)
}

/// Send each line over one session and print what comes back
pub async fn run(config: &AppConfig, lines: &[String], as_json: bool) -> Result<()> {
    let addr = target_addr(config)?;
    let mut client = DaemonClient::connect(addr).await?.with_protocol(&config.protocol);

    for line in lines {
        let frame = client.request(line).await?;
        if as_json {
            println!("{}", json!({ "request": line, "frame": frame.as_ref().map(frame_json) }));
        } else if let Some(frame) = frame {
            print_frame(&frame)?;
        }
    }

    client.quit().await?;
    Ok(())
}

fn print_frame(frame: &Frame) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    match frame {
        Frame::Cwd(path) => writeln!(stdout, "{}", path)?,
        Frame::FileContent { content, .. } => {
            stdout.write_all(content)?;
            if !content.ends_with(b"\n") {
                writeln!(stdout)?;
            }
        }
        Frame::ProcessList(processes) => {
            writeln!(stdout, "{:>5} {:>5} CMD", "PID", "PPID")?;
            for process in processes {
                stdout.write_all(process.to_line().as_bytes())?;
            }
        }
        Frame::Listing(entries) => {
            for entry in entries {
                stdout.write_all(entry.to_line().as_bytes())?;
            }
        }
        Frame::Error => writeln!(stdout, "error")?,
    }
    Ok(())
}

fn frame_json(frame: &Frame) -> serde_json::Value {
    match frame {
        Frame::Cwd(path) => json!({ "type": "cwd", "path": path }),
        Frame::FileContent { path, content } => json!({
            "type": "file_content",
            "path": path,
            "content": String::from_utf8_lossy(content),
        }),
        Frame::ProcessList(processes) => json!({
            "type": "process_list",
            "processes": processes,
        }),
        Frame::Listing(entries) => json!({
            "type": "listing",
            "entries": entries,
        }),
        Frame::Error => json!({ "type": "error" }),
    }
}
