use super::*;
use serde::Deserialize;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Ping {
    n: u32,
}

#[tokio::test]
async fn round_trips_a_message_through_a_duplex_pipe() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    write_message(&mut a, &Ping { n: 7 }).await.unwrap();
    let got: Ping = read_message(&mut b).await.unwrap();
    assert_eq!(got, Ping { n: 7 });
}

#[tokio::test]
async fn rejects_a_frame_declaring_a_length_over_the_cap() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    a.write_all(&(MAX_FRAME_BYTES + 1).to_be_bytes()).await.unwrap();
    let result: Result<Ping, FramingError> = read_message(&mut b).await;
    assert!(matches!(result, Err(FramingError::FrameTooLarge(_))));
}

#[tokio::test]
async fn truncated_connection_is_reported_distinctly_from_other_io_errors() {
    let (mut a, mut b) = tokio::io::duplex(1024);
    a.write_all(&10u32.to_be_bytes()).await.unwrap();
    a.write_all(b"short").await.unwrap();
    drop(a);
    let result: Result<Ping, FramingError> = read_message(&mut b).await;
    assert!(matches!(result, Err(FramingError::Truncated)));
}
