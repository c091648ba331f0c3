//! The client request loop against scripted peers: negative answers,
//! pipelined-response tolerance and out-of-order delivery.

mod common;

use std::time::Duration;

use common::{ScriptStep, ScriptedPeer};
use zest::peer::{ChunkOutcome, Error, PeerConnection};
use zest_primitives::{ChunkRange, ChunkHash, InfoHash, PeerId, XorbHash};

const TIMEOUT: Duration = Duration::from_secs(5);

fn info_hash() -> InfoHash {
    InfoHash::from_xorb_hash(&XorbHash([0x11; 32]))
}

async fn connect(peer: &ScriptedPeer) -> PeerConnection {
    PeerConnection::connect(peer.addr, info_hash(), PeerId::generate(), 6881, TIMEOUT)
        .await
        .unwrap()
}

#[tokio::test]
async fn a_chunk_error_fails_the_request_but_keeps_the_connection_open() {
    let peer = ScriptedPeer::spawn(vec![
        ScriptStep::Fail {
            error_code: 42,
            message: "backing store offline".to_string(),
        },
        ScriptStep::Respond {
            chunk_offset: 0,
            data: vec![1, 2, 3, 4],
        },
    ])
    .await;
    let connection = connect(&peer).await;

    let failed = connection
        .request_chunk(ChunkHash([7; 32]), ChunkRange::new(0, 1))
        .await;
    assert!(matches!(
        failed,
        Err(Error::ChunkError { error_code: 42, ref message }) if message == "backing store offline"
    ));

    // The same connection still serves the next request.
    let served = connection
        .request_chunk(ChunkHash([7; 32]), ChunkRange::new(0, 1))
        .await
        .unwrap();
    assert_eq!(served.data, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn a_chunk_not_found_is_a_negative_answer() {
    let peer = ScriptedPeer::spawn(vec![ScriptStep::NotFound]).await;
    let connection = connect(&peer).await;

    let result = connection
        .request_chunk(ChunkHash([7; 32]), ChunkRange::new(0, 4))
        .await;

    assert!(matches!(result, Err(ref err @ Error::ChunkNotFound) if err.is_negative_response()));
}

#[tokio::test]
async fn an_unrelated_response_is_discarded_and_the_matching_one_returned() {
    let peer = ScriptedPeer::spawn(vec![ScriptStep::RespondWithRequestId {
        request_id: 0xDEAD,
        chunk_offset: 0,
        data: vec![9, 9, 9, 9],
    }])
    .await;
    let connection = connect(&peer).await;

    let served = connection
        .request_chunk(ChunkHash([7; 32]), ChunkRange::new(0, 1))
        .await
        .unwrap();

    assert_eq!(served.data, vec![9, 9, 9, 9]);
}

#[tokio::test]
async fn pipelined_requests_tolerate_reordered_responses() {
    let payloads = vec![vec![0u8; 4], vec![1u8; 4], vec![2u8; 4]];
    let peer = ScriptedPeer::spawn(vec![ScriptStep::CollectThenRespondInOrder {
        order: vec![2, 0, 1],
        data: payloads.clone(),
    }])
    .await;
    let connection = connect(&peer).await;

    let requests: Vec<_> = (0..3)
        .map(|i| (ChunkHash([i as u8; 32]), ChunkRange::new(0, 1)))
        .collect();
    let ids = connection.send_chunk_requests(&requests).await.unwrap();
    assert_eq!(ids.len(), 3);

    // Collect the three answers, whatever order they arrive in, then
    // assemble them back into request order by id.
    let mut assembled: Vec<Option<Vec<u8>>> = vec![None; 3];
    for _ in 0..3 {
        let answer = connection.receive_chunk_response().await.unwrap();
        let position = ids.iter().position(|id| *id == answer.request_id).unwrap();
        let ChunkOutcome::Received(chunk) = answer.outcome else {
            panic!("expected data for request {}", answer.request_id);
        };
        assembled[position] = Some(chunk.data);
    }

    let assembled: Vec<Vec<u8>> = assembled.into_iter().map(Option::unwrap).collect();
    assert_eq!(assembled, payloads);
}

#[tokio::test]
async fn a_peer_without_ut_xet_cannot_carry_chunk_requests() {
    // A plain BitTorrent peer: BEP 10 handshake advertising some other
    // extension, no ut_xet.
    use tokio::net::TcpListener;
    use zest::protocol::extended::{ExtendedHandshake, EXTENSION_HANDSHAKE_ID};
    use zest::protocol::handshake::Handshake;
    use zest::protocol::message::{self, Message};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = zest_primitives::PeerAddr::try_from(listener.local_addr().unwrap()).unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let remote = Handshake::read_from(&mut stream).await.unwrap();
        Handshake::new(remote.info_hash, PeerId(*b"-XX0001-000000000000"))
            .write_to(&mut stream)
            .await
            .unwrap();
        let handshake = ExtendedHandshake {
            extensions: vec![("ut_metadata".to_string(), 2)],
            port: None,
            version: None,
        };
        let frame = Message::Extended {
            ext_id: EXTENSION_HANDSHAKE_ID,
            payload: handshake.to_bytes(),
        };
        message::write_message(&mut stream, &frame).await.unwrap();
        // Hold the connection open until the test is done with it.
        let _ = message::read_message(&mut stream).await;
    });

    let connection = PeerConnection::connect(addr, info_hash(), PeerId::generate(), 6881, TIMEOUT)
        .await
        .unwrap();

    assert!(!connection.supports_xet());
    let result = connection
        .request_chunk(ChunkHash([7; 32]), ChunkRange::new(0, 1))
        .await;
    assert!(matches!(result, Err(Error::XetNotAdvertised)));
}

#[tokio::test]
async fn a_wrong_info_hash_in_the_peer_handshake_fails_the_connect() {
    use tokio::net::TcpListener;
    use zest::protocol::handshake::Handshake;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = zest_primitives::PeerAddr::try_from(listener.local_addr().unwrap()).unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let _ = Handshake::read_from(&mut stream).await.unwrap();
        // Answer for a different swarm.
        Handshake::new(InfoHash([0xEE; 20]), PeerId(*b"-XX0001-000000000000"))
            .write_to(&mut stream)
            .await
            .unwrap();
    });

    let result = PeerConnection::connect(addr, info_hash(), PeerId::generate(), 6881, TIMEOUT).await;

    assert!(matches!(result, Err(Error::InfoHashMismatch { .. })));
}
