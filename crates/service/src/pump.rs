// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Copies bytes from one child fd to the service's log writer and the
//! topic bus, without ever blocking on a slow subscriber.

use chrono::Utc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use raptor_bus::Bus;
use raptor_core::time_fmt::format_iso8601_utc;
use raptor_core::{LineClass, LogLine, StreamTag};
use raptor_log::{LineParser, SharedLogWriter};

/// Handle to a running pump task. Dropping it does not stop the pump —
/// call [`PumpHandle::stop`] (or drop the sender-side fd) to do that.
pub struct PumpHandle {
    stop_tx: Option<mpsc::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl PumpHandle {
    /// Cancel the pump, flushing any partial line as [`LineClass::Continued`],
    /// and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(()).await;
        }
        let _ = (&mut self.task).await;
    }
}

/// Spawn a task that reads `reader` to EOF (or cancellation), splits it
/// into lines via [`LineParser`], and publishes each one to `writer` (if
/// present) and `bus` under `service.<name>.<tag>`.
pub fn spawn_pump<R>(
    logger_name: String,
    tag: StreamTag,
    mut reader: R,
    writer: SharedLogWriter,
    bus: Bus<LogLine>,
) -> PumpHandle
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    let topic = format!("service.{logger_name}.{}", tag.as_str());

    let task = tokio::spawn(async move {
        let mut parser = LineParser::default();
        let mut buf = [0u8; 4096];
        loop {
            let n = tokio::select! {
                biased;
                _ = stop_rx.recv() => break,
                result = reader.read(&mut buf) => match result {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!(service = %logger_name, tag = tag.as_str(), error = %e, "stream pump read error");
                        break;
                    }
                },
            };
            let text = String::from_utf8_lossy(&buf[..n]);
            for (class, line) in parser.feed(&text) {
                emit(&logger_name, &topic, tag, class, line, &writer, &bus);
            }
        }
        if let Some((class, line)) = parser.flush() {
            emit(&logger_name, &topic, tag, class, line, &writer, &bus);
        }
    });

    PumpHandle {
        stop_tx: Some(stop_tx),
        task,
    }
}

fn emit(
    logger_name: &str,
    topic: &str,
    tag: StreamTag,
    class: LineClass,
    text: String,
    writer: &SharedLogWriter,
    bus: &Bus<LogLine>,
) {
    let line = LogLine::new(format_iso8601_utc(Utc::now()), logger_name, tag, class, text);
    writer.write_line(&line);
    bus.publish(topic, line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn pump_publishes_lines_to_bus() {
        let bus: Bus<LogLine> = Bus::new();
        let mut sub = bus.subscribe("service.echoer.out", 10).unwrap();

        let (mut writer_end, reader_end) = duplex(1024);
        let handle = spawn_pump("echoer".to_string(), StreamTag::Out, reader_end, SharedLogWriter::none(), bus.clone());

        writer_end.write_all(b"hello\nworld\n").await.unwrap();
        drop(writer_end);

        let first = sub.recv().await.unwrap();
        assert_eq!(first.text, "hello");
        let second = sub.recv().await.unwrap();
        assert_eq!(second.text, "world");

        handle.stop().await;
    }

    #[tokio::test]
    async fn stop_flushes_partial_line_as_continued() {
        let bus: Bus<LogLine> = Bus::new();
        let mut sub = bus.subscribe("*", 10).unwrap();

        let (mut writer_end, reader_end) = duplex(1024);
        let handle = spawn_pump("svc".to_string(), StreamTag::Out, reader_end, SharedLogWriter::none(), bus.clone());
        writer_end.write_all(b"no newline yet").await.unwrap();
        drop(writer_end);

        let line = sub.recv().await.unwrap();
        assert_eq!(line.class, LineClass::Continued);
        assert_eq!(line.text, "no newline yet");

        handle.stop().await;
    }
}
