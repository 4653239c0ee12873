pub trait FindBytes {
    /// Absolute index of the first `needle` occurrence fully inside `[from, to)`.
    fn find_bytes(&self, needle: &[u8], from: usize, to: usize) -> Option<usize>;
}

impl FindBytes for [u8] {
    fn find_bytes(&self, needle: &[u8], from: usize, to: usize) -> Option<usize> {
        let to = to.min(self.len());
        if needle.is_empty() || from >= to || to - from < needle.len() {
            return None;
        }
        let first = needle[0];
        let last_start = to - needle.len();
        let mut i = from;
        while i <= last_start {
            match self[i..=last_start].iter().position(|&b| b == first) {
                Some(offset) => {
                    i += offset;
                    if &self[i..i + needle.len()] == needle {
                        return Some(i);
                    }
                    i += 1;
                }
                None => return None,
            }
        }
        None
    }
}
