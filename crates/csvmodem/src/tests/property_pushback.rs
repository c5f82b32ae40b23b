use std::sync::Arc;

use quickcheck::QuickCheck;

use super::utils::{ChunkedSource, test_count};
use crate::{PushbackBuffer, SharedPool};

/// Property: reading a span, pushing it back and reading again yields the same
/// characters, and the stream as a whole loses or repeats nothing.
#[test]
fn pushback_fidelity_quickcheck() {
    #[allow(clippy::needless_pass_by_value)]
    fn prop(text: String, splits: Vec<usize>, window: usize, reads: Vec<(usize, bool)>) -> bool {
        let mut source = ChunkedSource::new(&text, splits);
        let mut buffer = PushbackBuffer::new(Arc::new(SharedPool::new()), 1 + window % 8, 1 << 16);
        let mut out = String::new();

        for (size, push) in reads {
            let mut dst = vec!['\0'; 1 + size % 8];
            let n = buffer.read_into(&mut dst, &mut source).unwrap();
            if n == 0 {
                break;
            }
            if push {
                buffer.push_back(&dst[..n]).unwrap();
                let mut again = vec!['\0'; dst.len()];
                let m = buffer.read_into(&mut again, &mut source).unwrap();
                if m < n || again[..n] != dst[..n] {
                    return false;
                }
                out.extend(&again[..m]);
            } else {
                out.extend(&dst[..n]);
            }
        }

        let mut dst = ['\0'; 5];
        loop {
            let n = buffer.read_into(&mut dst, &mut source).unwrap();
            if n == 0 {
                break;
            }
            out.extend(&dst[..n]);
        }
        out == text
    }

    QuickCheck::new()
        .tests(test_count())
        .quickcheck(prop as fn(String, Vec<usize>, usize, Vec<(usize, bool)>) -> bool);
}
