use eyre::Result;
use magicbuf::RingBuffer;
use rstest::*;

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// Byte at position `i` of the reference stream.
fn stream_byte(i: usize) -> u8 {
    (i.wrapping_mul(31) ^ (i >> 8)) as u8
}

#[rstest]
#[case::single_page(1, 61, 127)]
#[case::uneven_chunks(1, 509, 333)]
#[case::multi_page(4, 4093, 2048)]
fn stream_survives_many_wraparounds(
    #[case] pages: usize,
    #[case] put_chunk: usize,
    #[case] get_chunk: usize,
) -> Result<()> {
    let capacity = page_size() * pages;
    let mut buffer = RingBuffer::new(capacity)?;

    // Push ~20 buffer-fulls through so every offset serves as the seam
    // at least once.
    let total = capacity * 20;
    let mut produced = 0;
    let mut consumed = 0;
    let mut out = vec![0u8; get_chunk];

    while consumed < total {
        if produced < total {
            let want = put_chunk.min(total - produced);
            let chunk: Vec<u8> = (produced..produced + want).map(stream_byte).collect();
            produced += buffer.put(&chunk);
        }

        let got = buffer.get(&mut out);
        for (offset, &byte) in out[..got].iter().enumerate() {
            assert_eq!(
                byte,
                stream_byte(consumed + offset),
                "stream corrupted at byte {}",
                consumed + offset
            );
        }
        consumed += got;

        assert_eq!(buffer.used() + buffer.available(), capacity - 1);
        assert_eq!(buffer.used(), produced - consumed);
    }

    assert!(buffer.is_empty());
    buffer.destroy()?;
    Ok(())
}

#[rstest]
fn parse_frames_across_the_seam() -> Result<()> {
    let capacity = page_size();
    let mut buffer = RingBuffer::new(capacity)?;

    // Framed messages, each terminated by "\r\n", fed through a buffer
    // far smaller than the whole stream.
    let mut expected = Vec::new();
    for i in 0..1000 {
        expected.push(format!("frame number {i} with some padding"));
    }

    let mut pending = expected.iter().peekable();
    let mut in_flight = 0usize;
    let mut decoded = Vec::new();

    loop {
        while let Some(frame) = pending.peek() {
            let wire = format!("{frame}\r\n");
            if buffer.put_all(wire.as_bytes()).is_err() {
                break;
            }
            in_flight += 1;
            pending.next();
        }

        match buffer.search(b"\r\n", 0, 0) {
            Ok(Some(end)) => {
                let mut frame = vec![0u8; end];
                let copied = buffer.get_min(&mut frame, end)?;
                assert_eq!(copied, end);
                buffer.skip(2)?;
                decoded.push(String::from_utf8(frame)?);
                in_flight -= 1;
            }
            Ok(None) | Err(_) => {
                if in_flight == 0 && pending.peek().is_none() {
                    break;
                }
            }
        }
    }

    assert_eq!(decoded, expected);
    Ok(())
}

#[rstest]
fn peek_rollback_reread_consistency() -> Result<()> {
    let capacity = page_size();
    let mut buffer = RingBuffer::new(capacity)?;

    // Drive the cursors around the ring and verify at every position
    // that rollback after get re-yields identical bytes.
    let payload: Vec<u8> = (0..251).map(|i| i as u8).collect();
    for _ in 0..100 {
        buffer.put_all(&payload)?;

        let mut peeked = vec![0u8; payload.len()];
        assert_eq!(buffer.peek(0, &mut peeked), payload.len());

        let mut first = vec![0u8; payload.len()];
        buffer.get(&mut first);
        buffer.rollback(payload.len())?;
        let mut second = vec![0u8; payload.len()];
        buffer.get(&mut second);

        assert_eq!(first, second);
        assert_eq!(first, peeked);
        assert_eq!(first, payload);
    }

    Ok(())
}
