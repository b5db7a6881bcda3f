//! Byte-level protocol primitives over one TCP socket.
//!
//! All multi-byte values travel in network byte order: integers as 4-byte
//! signed, identifiers as 8-byte unsigned, doubles as 8-byte IEEE-754.
//! Text lines are UTF-8 terminated by `\n`. Arrays are count-prefixed, 2D
//! matrices are dimension-prefixed (rows, then cols) and streamed
//! column-major.
//!
//! Every receive is bounded by the channel's current timeout. A timeout,
//! I/O failure or desync (oversized count, stalled matrix read) marks the
//! channel broken: the byte stream position is indeterminate at that point
//! and the only recovery is reconnecting, so all further use fails with
//! [`LinkError::NotConnected`].

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time;

use crate::error::{LinkError, Result};
use crate::geometry::Pose;
use crate::items::{Item, ItemType};
use crate::matrix::Matrix2D;

/// Largest element count accepted for a count-prefixed array. A declared
/// count above this means the stream is desynchronized, not that a robot
/// grew fifty-one axes.
pub const MAX_ARRAY_VALUES: i32 = 50;

/// Largest element count accepted for a 2D matrix, to bound allocation
/// when a desynced stream declares garbage dimensions.
const MAX_MATRIX_VALUES: usize = 8 * 1024 * 1024;

/// One side of the protocol conversation.
///
/// The channel carries exactly one outstanding request at a time; there
/// are no request identifiers, so responses are matched to requests purely
/// by ordering. All methods take `&mut self`, which makes overlapping use
/// impossible to express.
#[derive(Debug)]
pub struct Channel {
    /// Buffered reader half; binary reads and line reads share the buffer.
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
    broken: bool,
}

impl Channel {
    pub fn new(stream: TcpStream, timeout: Duration) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout,
            broken: false,
        }
    }

    /// Current per-receive timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Replace the per-receive timeout, returning the previous value.
    /// Long-running operations raise it for the scope of their blocking
    /// receive and restore the previous value on every exit path.
    pub fn set_timeout(&mut self, timeout: Duration) -> Duration {
        std::mem::replace(&mut self.timeout, timeout)
    }

    /// Whether an earlier transport failure poisoned this channel.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn fail(&mut self, err: LinkError) -> LinkError {
        self.broken = true;
        err
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.broken {
            return Err(LinkError::NotConnected);
        }
        Ok(())
    }

    async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_usable()?;
        match self.writer.write_all(bytes).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(LinkError::Io(e))),
        }
    }

    async fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_usable()?;
        match time::timeout(self.timeout, self.reader.read_exact(buf)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(self.fail(LinkError::Io(e))),
            Err(_) => Err(self.fail(LinkError::Timeout(self.timeout))),
        }
    }

    /// Send a newline-terminated UTF-8 line. Embedded line terminators
    /// would corrupt the framing, so they are replaced by `<br>` before
    /// transmission.
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let mut payload = if text.contains(['\n', '\r']) {
            text.replace('\r', "").replace('\n', "<br>").into_bytes()
        } else {
            text.as_bytes().to_vec()
        };
        payload.push(b'\n');
        self.send_bytes(&payload).await
    }

    /// Receive one line, with the terminator (and any trailing `\r`)
    /// stripped.
    pub async fn recv_line(&mut self) -> Result<String> {
        self.ensure_usable()?;
        let mut line = String::new();
        match time::timeout(self.timeout, self.reader.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(self.fail(LinkError::Protocol(
                "connection closed by server".to_string(),
            ))),
            Ok(Ok(_)) => {
                while line.ends_with('\n') || line.ends_with('\r') {
                    line.pop();
                }
                Ok(line)
            }
            Ok(Err(e)) => Err(self.fail(LinkError::Io(e))),
            Err(_) => {
                let timeout = self.timeout;
                Err(self.fail(LinkError::Timeout(timeout)))
            }
        }
    }

    pub async fn send_int(&mut self, value: i32) -> Result<()> {
        self.send_bytes(&value.to_be_bytes()).await
    }

    pub async fn recv_int(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.recv_exact(&mut buf).await?;
        Ok(i32::from_be_bytes(buf))
    }

    /// Send a handle. Only the 8-byte identifier goes on the wire; the
    /// type tag is local state.
    pub async fn send_item(&mut self, item: Item) -> Result<()> {
        self.send_bytes(&item.id().to_be_bytes()).await
    }

    /// Receive a handle. The wire carries the identifier only, so the
    /// returned handle is tagged [`ItemType::Unknown`].
    pub async fn recv_item(&mut self) -> Result<Item> {
        let mut buf = [0u8; 8];
        self.recv_exact(&mut buf).await?;
        Ok(Item::new(u64::from_be_bytes(buf), ItemType::Unknown))
    }

    /// Send a pose as 16 doubles, column-major.
    pub async fn send_pose(&mut self, pose: &Pose) -> Result<()> {
        let mut buf = [0u8; 16 * 8];
        for (chunk, value) in buf.chunks_exact_mut(8).zip(pose.to_col_major()) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        self.send_bytes(&buf).await
    }

    pub async fn recv_pose(&mut self) -> Result<Pose> {
        let mut buf = [0u8; 16 * 8];
        self.recv_exact(&mut buf).await?;
        let mut values = [0.0; 16];
        for (value, chunk) in values.iter_mut().zip(buf.chunks_exact(8)) {
            *value = f64::from_be_bytes(chunk.try_into().unwrap());
        }
        Ok(Pose::from_col_major(&values))
    }

    /// Send a 3D point as 3 doubles.
    pub async fn send_xyz(&mut self, point: &[f64; 3]) -> Result<()> {
        let mut buf = [0u8; 3 * 8];
        for (chunk, value) in buf.chunks_exact_mut(8).zip(point) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        self.send_bytes(&buf).await
    }

    pub async fn recv_xyz(&mut self) -> Result<[f64; 3]> {
        let mut buf = [0u8; 3 * 8];
        self.recv_exact(&mut buf).await?;
        let mut point = [0.0; 3];
        for (value, chunk) in point.iter_mut().zip(buf.chunks_exact(8)) {
            *value = f64::from_be_bytes(chunk.try_into().unwrap());
        }
        Ok(point)
    }

    /// Send a count-prefixed double array. An empty slice encodes an
    /// absent optional array (count 0, no values).
    pub async fn send_array(&mut self, values: &[f64]) -> Result<()> {
        let mut buf = Vec::with_capacity(4 + values.len() * 8);
        buf.extend_from_slice(&(values.len() as i32).to_be_bytes());
        for value in values {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        self.send_bytes(&buf).await
    }

    /// Receive a count-prefixed double array. A declared count outside
    /// `0..=`[`MAX_ARRAY_VALUES`] is treated as desync and no value bytes
    /// are consumed.
    pub async fn recv_array(&mut self) -> Result<Vec<f64>> {
        let count = self.recv_int().await?;
        if !(0..=MAX_ARRAY_VALUES).contains(&count) {
            return Err(self.fail(LinkError::Protocol(format!(
                "array count {count} outside 0..={MAX_ARRAY_VALUES}"
            ))));
        }
        let mut buf = vec![0u8; count as usize * 8];
        self.recv_exact(&mut buf).await?;
        Ok(buf
            .chunks_exact(8)
            .map(|chunk| f64::from_be_bytes(chunk.try_into().unwrap()))
            .collect())
    }

    /// Send a 2D matrix: rows, cols, then the elements column-major.
    pub async fn send_matrix(&mut self, matrix: &Matrix2D) -> Result<()> {
        let mut buf = Vec::with_capacity(8 + matrix.as_col_major().len() * 8);
        buf.extend_from_slice(&(matrix.rows() as i32).to_be_bytes());
        buf.extend_from_slice(&(matrix.cols() as i32).to_be_bytes());
        for value in matrix.as_col_major() {
            buf.extend_from_slice(&value.to_be_bytes());
        }
        self.send_bytes(&buf).await
    }

    /// Receive a 2D matrix.
    ///
    /// The element stream is consumed incrementally: the timeout bounds
    /// each stall, not the whole transfer, so a large matrix arriving in
    /// many segments is fine as long as data keeps flowing. If the stream
    /// stalls, the partial buffer is discarded and the channel is marked
    /// broken.
    pub async fn recv_matrix(&mut self) -> Result<Matrix2D> {
        let rows = self.recv_int().await?;
        let cols = self.recv_int().await?;
        if rows < 0 || cols < 0 {
            return Err(self.fail(LinkError::Protocol(format!(
                "negative matrix dimensions {rows}x{cols}"
            ))));
        }
        let total = rows as usize * cols as usize;
        if total > MAX_MATRIX_VALUES {
            return Err(self.fail(LinkError::Protocol(format!(
                "matrix size {rows}x{cols} exceeds {MAX_MATRIX_VALUES} values"
            ))));
        }
        if total == 0 {
            return Ok(Matrix2D::with_size(rows as usize, cols as usize));
        }

        let mut bytes = vec![0u8; total * 8];
        let mut filled = 0;
        while filled < bytes.len() {
            match time::timeout(self.timeout, self.reader.read(&mut bytes[filled..])).await {
                Ok(Ok(0)) => {
                    return Err(self.fail(LinkError::Protocol(
                        "connection closed mid-matrix".to_string(),
                    )))
                }
                Ok(Ok(n)) => filled += n,
                Ok(Err(e)) => return Err(self.fail(LinkError::Io(e))),
                Err(_) => {
                    let timeout = self.timeout;
                    return Err(self.fail(LinkError::Timeout(timeout)));
                }
            }
        }

        let values: Vec<f64> = bytes
            .chunks_exact(8)
            .map(|chunk| f64::from_be_bytes(chunk.try_into().unwrap()))
            .collect();
        Ok(Matrix2D::from_col_major(rows as usize, &values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Connected pair of channels over loopback TCP.
    async fn channel_pair() -> (Channel, Channel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        (
            Channel::new(client.expect("connect"), TEST_TIMEOUT),
            Channel::new(server, TEST_TIMEOUT),
        )
    }

    #[tokio::test]
    async fn line_round_trip() {
        let (mut a, mut b) = channel_pair().await;
        a.send_line("G_Item").await.expect("send");
        assert_eq!(b.recv_line().await.expect("recv"), "G_Item");
    }

    #[tokio::test]
    async fn line_sanitizes_embedded_newlines() {
        let (mut a, mut b) = channel_pair().await;
        a.send_line("two\nlines\r\n").await.expect("send");
        assert_eq!(b.recv_line().await.expect("recv"), "two<br>lines<br>");
    }

    #[tokio::test]
    async fn int_round_trip_is_big_endian() {
        let (mut a, mut b) = channel_pair().await;
        a.send_int(-7).await.expect("send");
        a.send_int(20500).await.expect("send");
        assert_eq!(b.recv_int().await.expect("recv"), -7);
        assert_eq!(b.recv_int().await.expect("recv"), 20500);
    }

    #[tokio::test]
    async fn pose_round_trip_identity_column_major() {
        let (mut a, mut b) = channel_pair().await;
        a.send_pose(&Pose::identity()).await.expect("send");
        let pose = b.recv_pose().await.expect("recv");
        let expected = [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        assert_eq!(pose.to_col_major(), expected);
    }

    #[tokio::test]
    async fn pose_round_trip_bit_exact() {
        let (mut a, mut b) = channel_pair().await;
        let pose = Pose::from_xyzwpr(100.5, -0.125, 3.75, 10.0, 20.0, 30.0);
        a.send_pose(&pose).await.expect("send");
        let got = b.recv_pose().await.expect("recv");
        for (sent, received) in pose.to_col_major().iter().zip(got.to_col_major()) {
            assert_eq!(sent.to_bits(), received.to_bits());
        }
    }

    #[tokio::test]
    async fn xyz_round_trip() {
        let (mut a, mut b) = channel_pair().await;
        a.send_xyz(&[1.5, -2.5, 3.5]).await.expect("send");
        assert_eq!(b.recv_xyz().await.expect("recv"), [1.5, -2.5, 3.5]);
    }

    #[tokio::test]
    async fn array_round_trip() {
        let (mut a, mut b) = channel_pair().await;
        let joints = [10.0, -20.0, 30.0, -40.0, 50.0, -60.0];
        a.send_array(&joints).await.expect("send");
        assert_eq!(b.recv_array().await.expect("recv"), joints);

        // Absent array: count 0, no values.
        a.send_array(&[]).await.expect("send");
        assert!(b.recv_array().await.expect("recv").is_empty());
    }

    #[tokio::test]
    async fn array_rejects_oversized_count() {
        let (mut a, mut b) = channel_pair().await;
        a.send_int(51).await.expect("send");
        // Write a sentinel right after: it must NOT be consumed as array data.
        a.send_int(1234).await.expect("send");
        let err = b.recv_array().await.expect_err("must reject");
        assert!(matches!(err, LinkError::Protocol(_)), "got {err:?}");
        assert!(b.is_broken());
        // Channel refuses further use after desync.
        assert!(matches!(
            b.recv_int().await.expect_err("poisoned"),
            LinkError::NotConnected
        ));
    }

    #[tokio::test]
    async fn handle_round_trip_drops_type_tag() {
        let (mut a, mut b) = channel_pair().await;
        let item = Item::new(0xDEAD_BEEF_0042, ItemType::Robot);
        a.send_item(item).await.expect("send");
        let got = b.recv_item().await.expect("recv");
        assert_eq!(got, item);
        assert_eq!(got.item_type(), ItemType::Unknown);
    }

    #[tokio::test]
    async fn matrix_round_trip() {
        let (mut a, mut b) = channel_pair().await;
        let mut mat = Matrix2D::with_size(3, 0);
        for c in 0..7 {
            mat.push_col(&[c as f64, c as f64 * 0.5, c as f64 - 9.25]);
        }
        a.send_matrix(&mat).await.expect("send");
        let got = b.recv_matrix().await.expect("recv");
        assert_eq!(got, mat);
    }

    #[tokio::test]
    async fn matrix_tolerates_partial_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (client, (server, _)) =
            tokio::join!(TcpStream::connect(addr), async { listener.accept().await.unwrap() });
        let mut receiver = Channel::new(server, TEST_TIMEOUT);

        // Hand-feed the matrix in small delayed fragments.
        let writer = tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut raw = Vec::new();
            raw.extend_from_slice(&2i32.to_be_bytes());
            raw.extend_from_slice(&3i32.to_be_bytes());
            for v in [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0] {
                raw.extend_from_slice(&v.to_be_bytes());
            }
            let mut stream = client.expect("connect");
            for fragment in raw.chunks(5) {
                stream.write_all(fragment).await.expect("write");
                stream.flush().await.expect("flush");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        });

        let got = receiver.recv_matrix().await.expect("recv");
        writer.await.expect("writer");
        assert_eq!((got.rows(), got.cols()), (2, 3));
        assert_eq!(got.as_col_major(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[tokio::test]
    async fn matrix_stall_discards_partial_and_poisons() {
        let (mut a, mut b) = channel_pair().await;
        b.set_timeout(Duration::from_millis(50));
        // Declare 2x2 but deliver only one element.
        a.send_int(2).await.expect("send");
        a.send_int(2).await.expect("send");
        a.send_bytes(&1.0f64.to_be_bytes()).await.expect("send");
        let err = b.recv_matrix().await.expect_err("must stall");
        assert!(matches!(err, LinkError::Timeout(_)), "got {err:?}");
        assert!(b.is_broken());
    }

    #[tokio::test]
    async fn timeout_poisons_channel() {
        let (_a, mut b) = channel_pair().await;
        b.set_timeout(Duration::from_millis(50));
        let err = b.recv_int().await.expect_err("nothing to read");
        assert!(matches!(err, LinkError::Timeout(_)));
        assert!(b.is_broken());
        assert!(matches!(
            b.recv_line().await.expect_err("poisoned"),
            LinkError::NotConnected
        ));
    }

    #[tokio::test]
    async fn set_timeout_returns_previous() {
        let (mut a, _b) = channel_pair().await;
        let previous = a.set_timeout(Duration::from_secs(3600));
        assert_eq!(previous, TEST_TIMEOUT);
        assert_eq!(a.timeout(), Duration::from_secs(3600));
    }
}
