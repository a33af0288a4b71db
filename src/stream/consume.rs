//! Consumer bridge: drive a stream as an ordinary iterator.

use super::step::Stream;

/// Iterator over a stream. A producer failure is yielded as the final
/// `Err` item; the iterator is exhausted afterwards.
pub struct StreamIter<T> {
    stream: Option<Stream<T>>,
}

impl<T: Send + 'static> Iterator for StreamIter<T> {
    type Item = crate::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.stream.take()?.uncons() {
            Ok(None) => None,
            Ok(Some((v, rest))) => {
                self.stream = Some(rest);
                Some(Ok(v))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T: Send + 'static> IntoIterator for Stream<T> {
    type Item = crate::Result<T>;
    type IntoIter = StreamIter<T>;

    fn into_iter(self) -> StreamIter<T> {
        StreamIter { stream: Some(self) }
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Drain the whole stream into a vector.
    pub fn to_vec(self) -> crate::Result<Vec<T>> {
        self.into_iter().collect()
    }

    /// Run an action for every value, stopping on the first failure.
    pub fn try_for_each<F>(self, mut f: F) -> crate::Result<()>
    where
        F: FnMut(T) -> crate::Result<()>,
    {
        for v in self {
            f(v?)?;
        }
        Ok(())
    }
}
