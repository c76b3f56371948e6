//! Stdio transport: newline-delimited JSON-RPC.
//!
//! stdout is reserved for protocol messages. Everything else (status lines,
//! child output) goes to stderr.

use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use watch_core::McpServer;

/// Serve MCP on the host's stdin/stdout until stdin closes.
pub async fn serve(mcp: McpServer) -> io::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    serve_lines(&mcp, stdin, stdout).await
}

/// One request (or batch) per line in, one response per line out.
pub async fn serve_lines<R, W>(mcp: &McpServer, reader: R, mut writer: W) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(reply) = mcp.handle_message(&line) {
            writer.write_all(reply.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }
    log::debug!("stdio transport closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::sync::Arc;
    use watch_core::store::{LogStore, Origin};

    async fn exchange(store: Arc<LogStore>, input: &str) -> Vec<Value> {
        let mcp = McpServer::new(store);
        let mut output = Vec::new();
        serve_lines(&mcp, input.as_bytes(), &mut output).await.unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn replies_one_line_per_request() {
        let store = Arc::new(LogStore::new(10));
        store.append(Origin::Stderr, "Error: connection refused");

        let input = concat!(
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05"}}"#,
            "\n",
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            "\n\n",
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"search_logs","arguments":{"query":"error"}}}"#,
            "\n",
        );
        let replies = exchange(store, input).await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], 1);
        assert_eq!(replies[0]["result"]["protocolVersion"], "2024-11-05");
        assert_eq!(replies[1]["id"], 2);
        assert_eq!(
            replies[1]["result"]["content"][0]["text"],
            "ERR: Error: connection refused"
        );
    }

    #[tokio::test]
    async fn garbage_line_gets_parse_error() {
        let replies = exchange(Arc::new(LogStore::new(10)), "not json\n").await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn empty_input_ends_cleanly() {
        let replies = exchange(Arc::new(LogStore::new(10)), "").await;
        assert!(replies.is_empty());
    }
}
