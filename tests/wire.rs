use rand::{Rng, SeedableRng, rngs::StdRng};

use packetlink::{
    Config, PacketServer, Message,
    frame::{self, Kind},
    loopback::{Pipe, ManualClock},
    };


type Server = PacketServer<Pipe, ManualClock>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn server(pipe: Pipe, clock: &ManualClock, config: Config) -> Server {
    let mut server = PacketServer::new(pipe, clock.clone(), config).expect("invalid config");
    server.set_receive_buffer(Some(Message::new()));
    server
}

/// any byte with an unknown packet kind in its low nibble
fn garbage(rng: &mut StdRng) -> u8 {
    (rng.random_range(0 .. 16u8) << 4) | rng.random_range(12 ..= 15u8)
}


#[test]
fn packets_on_the_wire_decode() {
    init();
    let clock = ManualClock::new();
    let (pa, _pb) = Pipe::pair();
    let wire = pa.outgoing();
    let mut a = server(pa, &clock, Config::default().with_port(4));

    let payload: Vec<u8> = (0 .. 20).collect();
    a.send_to(9, &payload).unwrap();
    a.poll().unwrap();

    let bytes: Vec<u8> = wire.borrow_mut().drain(..).collect();
    let packet = frame::decode(&bytes, true).unwrap();
    assert_eq!(packet.header.kind(), Kind::SendBlock);
    assert_eq!(packet.header.sequence().value(), 0);
    let ports = packet.ports.unwrap();
    assert_eq!((ports.source().value(), ports.destination().value()), (4, 9));
    assert_eq!(packet.payload, &payload[..]);

    // the retransmission is identical
    for _ in 0 .. 100 {
        clock.advance(1);
        a.poll().unwrap();
    }
    let again: Vec<u8> = wire.borrow_mut().drain(..).collect();
    assert_eq!(again, bytes);
}

#[test]
fn survives_line_noise() {
    init();
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let clock = ManualClock::new();
    let (pa, pb) = Pipe::pair();
    let wire = pa.outgoing();
    let mut a = server(pa, &clock, Config::default());
    let mut b = server(pb, &clock, Config::default());

    for _ in 0 .. 50 {
        if rng.random_bool(0.3) {
            for _ in 0 .. rng.random_range(1 .. 5) {
                wire.borrow_mut().push_back(garbage(&mut rng));
            }
        }
        let size = rng.random_range(0 .. 40);
        let payload: Vec<u8> = (0 .. size).map(|_| rng.random()).collect();
        a.send(&payload).unwrap();

        let mut received = None;
        for _ in 0 .. 1000 {
            a.poll().unwrap();
            b.poll().unwrap();
            if let Some(message) = b.take_message() {
                assert!(received.is_none(), "payload delivered twice");
                received = Some(message);
            }
            if a.buffer_sent() && received.is_some()
                {break}
            clock.advance(1);
        }
        assert!(a.buffer_sent());
        assert!(!a.send_error());
        assert_eq!(received.expect("payload never delivered").data(), &payload[..]);
    }
    assert!(b.statistics().flushes > 0);
}

#[test]
fn lossy_line_delivers_exactly_once() {
    init();
    let mut rng = StdRng::seed_from_u64(7);
    let clock = ManualClock::new();
    let (pa, pb) = Pipe::pair();
    let forward = pa.outgoing();
    let backward = pb.outgoing();
    let config = Config::default().with_retries(20);
    let mut a = server(pa, &clock, config);
    let mut b = server(pb, &clock, config);

    let sent: Vec<Vec<u8>> = (0 .. 40u8).map(|i| vec![i; usize::from(i % 5)]).collect();
    let mut delivered = Vec::new();
    for payload in &sent {
        a.send(payload).unwrap();
        for _ in 0 .. 10_000 {
            a.poll().unwrap();
            if !forward.borrow().is_empty() && rng.random_bool(0.3) {
                forward.borrow_mut().clear();
            }
            b.poll().unwrap();
            if !backward.borrow().is_empty() && rng.random_bool(0.3) {
                backward.borrow_mut().clear();
            }
            if let Some(message) = b.take_message() {
                delivered.push(message.data().to_vec());
            }
            if a.buffer_sent()
                {break}
            clock.advance(1);
        }
        assert!(a.buffer_sent());
        assert!(!a.send_error());
    }
    // the last ack may have been lost after delivery, nothing more can arrive
    assert_eq!(delivered, sent);
    assert!(b.statistics().duplicates > 0);
    assert!(a.statistics().retransmissions > 0);
}
