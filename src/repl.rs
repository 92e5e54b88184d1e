use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::runtime::NodeHandle;

/// Line-oriented command loop bound to one running node:
///
///   append <item>   queue a client entry on this node
///   state           print the server state
///   quit            exit
///
/// Commands never cross the network; they feed the node's own event queue
/// through its handle.
pub async fn run(handle: NodeHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            break;
        }
        if line == "state" {
            handle.dump_state().await?;
            continue;
        }
        if let Some(item) = line.strip_prefix("append ") {
            handle.client_append(item.to_string()).await?;
            continue;
        }
        println!("commands: append <item> | state | quit");
    }
    Ok(())
}
