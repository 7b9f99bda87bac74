//! Framed output of [`OutputUnit`]s.
//!
//! [`UnitCodec`] plugs the unit wire format into `tokio_util`'s framing so
//! any `AsyncWrite` can serve as the output sink.

use bytes::BytesMut;
use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;

use crate::error::BlitError;
use crate::unit::OutputUnit;

pub struct UnitCodec;

impl tokio_util::codec::Encoder<OutputUnit> for UnitCodec {
    type Error = BlitError;

    fn encode(&mut self, item: OutputUnit, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.encoded_len());
        item.encode(dst);
        Ok(())
    }
}

/// Drain `units` into `writer` until the sender side closes. Returns the
/// number of units written.
pub async fn write_units<W>(mut units: mpsc::Receiver<OutputUnit>, writer: W) -> Result<u64, BlitError>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, UnitCodec);
    let mut written = 0u64;
    while let Some(unit) = units.recv().await {
        sink.send(unit).await?;
        written += 1;
    }
    sink.close().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn units_are_written_back_to_back() {
        let (tx, rx) = mpsc::channel(4);
        for i in 0..3u8 {
            tx.send(OutputUnit {
                sequence: i as u64,
                frames: Vec::new(),
                audio: Bytes::from(vec![i; i as usize]),
            })
            .await
            .unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        let n = write_units(rx, &mut out).await.unwrap();
        assert_eq!(n, 3);
        assert_eq!(out, vec![0, 0, 0, 0, 0, 0, 0, 1, 1, 0, 0, 0, 2, 2, 2]);
    }
}
