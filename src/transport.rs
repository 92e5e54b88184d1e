use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use raftlet_raft::Message;

// ASCII decimal length field, right-justified and space-padded.
const LEN_FIELD_WIDTH: usize = 10;

// Frames claiming more than this are rejected as malformed.
const MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

pub fn encode_message(msg: &Message) -> io::Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(to_io_error)
}

pub fn decode_message(payload: &[u8]) -> io::Result<Message> {
    serde_json::from_slice(payload).map_err(to_io_error)
}

pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = format!("{:>width$}", payload.len(), width = LEN_FIELD_WIDTH);
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; LEN_FIELD_WIDTH];
    reader.read_exact(&mut header).await?;
    let len = std::str::from_utf8(&header)
        .ok()
        .and_then(|text| text.trim_start().parse::<usize>().ok())
        .ok_or_else(bad_header)?;
    if len > MAX_PAYLOAD_BYTES {
        return Err(bad_header());
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn send_message<W>(writer: &mut W, msg: &Message) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_frame(writer, &encode_message(msg)?).await
}

pub async fn recv_message<R>(reader: &mut R) -> io::Result<Message>
where
    R: AsyncRead + Unpin,
{
    decode_message(&read_frame(reader).await?)
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn bad_header() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "malformed length header")
}

#[cfg(test)]
mod tests {
    use super::*;
    use raftlet_raft::LogEntry;

    #[tokio::test]
    async fn roundtrip_append_entries() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        let msg = Message::AppendEntries {
            source: 0,
            dest: 2,
            term: 3,
            prev_index: 1,
            prev_term: 2,
            entries: vec![LogEntry::new(3, "set x"), LogEntry::new(3, "set y")],
            commit_index: 1,
        };

        send_message(&mut writer, &msg).await.expect("send message");
        let parsed = recv_message(&mut reader).await.expect("recv message");

        assert_eq!(msg, parsed);
    }

    #[tokio::test]
    async fn header_is_right_justified_ascii_decimal() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        write_frame(&mut writer, b"hello").await.expect("write frame");

        let mut header = [0u8; 10];
        reader.read_exact(&mut header).await.expect("read header");
        assert_eq!(&header, b"         5");

        let mut payload = [0u8; 5];
        reader.read_exact(&mut payload).await.expect("read payload");
        assert_eq!(&payload, b"hello");
    }

    #[tokio::test]
    async fn empty_payload_frames() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        write_frame(&mut writer, b"").await.expect("write frame");
        let payload = read_frame(&mut reader).await.expect("read frame");
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn garbage_header_is_rejected() {
        let (mut writer, mut reader) = tokio::io::duplex(4096);
        writer.write_all(b"not-a-len!").await.expect("write");

        let err = read_frame(&mut reader).await.expect_err("must reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn unknown_message_tag_is_rejected() {
        let err = decode_message(br#"{"type":"install_snapshot","term":1}"#)
            .expect_err("must reject");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn sentinel_fields_roundtrip_through_json() {
        let msg = Message::RequestVote {
            source: 1,
            dest: 0,
            term: 1,
            last_log_index: -1,
            last_log_term: -1,
        };
        let encoded = encode_message(&msg).expect("encode");
        assert_eq!(decode_message(&encoded).expect("decode"), msg);
    }
}
