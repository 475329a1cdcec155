use clap::Parser;
use eyre::Result;
use magicbuf::RingBuffer;
use nix::unistd;
use std::thread;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(name = "pipe")]
#[clap(about = "Stream a patterned byte sequence from a pipe through a magic ring buffer", long_about = None)]
struct Args {
    #[clap(short, long, default_value_t = 64 * 1024)]
    capacity: usize,

    #[clap(short, long, default_value_t = 8 * 1024 * 1024)]
    total: usize,

    #[clap(short, long, default_value_t = 4096)]
    read_chunk: usize,
}

fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut buffer = RingBuffer::new(args.capacity)?;
    info!(
        capacity = buffer.capacity(),
        page_size = buffer.page_size(),
        total = args.total,
        "buffer mapped"
    );

    let (rx, tx) = unistd::pipe()?;
    let total = args.total;
    let feeder = thread::spawn(move || -> Result<()> {
        let mut sent = 0usize;
        while sent < total {
            let want = 8192.min(total - sent);
            let chunk: Vec<u8> = (sent..sent + want).map(pattern_byte).collect();
            let mut offset = 0;
            while offset < chunk.len() {
                offset += unistd::write(&tx, &chunk[offset..])?;
            }
            sent += want;
        }
        // Dropping the write end signals end-of-input to the reader.
        Ok(())
    });

    let started = Instant::now();
    let mut received = 0usize;
    let mut out = vec![0u8; args.read_chunk];
    let mut eof = false;

    while !eof || !buffer.is_empty() {
        if !eof && buffer.available() > 0 && buffer.read_from(&rx, args.read_chunk)? == 0 {
            eof = true;
        }

        let got = buffer.get(&mut out);
        for &byte in &out[..got] {
            assert_eq!(byte, pattern_byte(received), "stream corrupted at byte {received}");
            received += 1;
        }
    }

    feeder.join().expect("feeder thread panicked")?;

    let elapsed = started.elapsed();
    info!(
        received,
        elapsed_ms = elapsed.as_millis() as u64,
        throughput_mib_s = format!("{:.1}", received as f64 / (1 << 20) as f64 / elapsed.as_secs_f64()),
        "stream drained and verified"
    );

    buffer.destroy()?;
    Ok(())
}
