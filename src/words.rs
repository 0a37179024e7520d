//! Bounded ranked buffer of the best words seen so far.
//!
//! Words rank by byte length (longer first); equal lengths rank lexicographically ascending.
//! The buffer keeps the [`CAPACITY`] best words ever inserted, best first, with unused slots
//! left as empty strings at the tail.

/// Number of slots in the ranked buffer.
pub const CAPACITY: usize = 3;

/// Separator between slots in the snapshot encoding.
pub const SEPARATOR: char = '\n';

/// Returns true if `a` strictly outranks `b`.
///
/// The empty string is outranked by every non-empty word, so empty slots always sort last.
pub fn outranks(a: &str, b: &str) -> bool {
    if a.len() == b.len() {
        return a < b;
    }
    a.len() > b.len()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Words {
    slots: [String; CAPACITY],
}

impl Words {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `word` at the first slot it outranks, shifting the tail right and dropping the
    /// last slot. Returns whether the buffer changed.
    ///
    /// Words containing [`SEPARATOR`] are dropped: they cannot be represented in a snapshot.
    pub fn insert(&mut self, word: &str) -> bool {
        if word.contains(SEPARATOR) {
            return false;
        }
        let Some(pos) = self.slots.iter().position(|slot| outranks(word, slot)) else {
            return false;
        };
        self.slots[pos..].rotate_right(1);
        self.slots[pos] = word.to_string();
        true
    }

    pub fn as_slice(&self) -> &[String] {
        &self.slots
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.slots.to_vec()
    }

    /// Number of non-empty slots.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_empty()).count()
    }

    /// Slots joined with [`SEPARATOR`], empty slots included.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = [0u8; 4];
        let sep: &str = SEPARATOR.encode_utf8(&mut buf);
        self.slots.join(sep).into_bytes()
    }

    /// Decode the output of [`Words::encode`].
    ///
    /// Exactly [`CAPACITY`] slots are required and they must already be in rank order with no
    /// empty slot ahead of a word; anything else is rejected as a whole.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(bytes).map_err(DecodeError::Utf8)?;
        let parts: Vec<&str> = text.split(SEPARATOR).collect();
        if parts.len() != CAPACITY {
            return Err(DecodeError::SlotCount {
                expected: CAPACITY,
                got: parts.len(),
            });
        }

        let mut words = Words::new();
        for (slot, part) in words.slots.iter_mut().zip(parts) {
            *slot = part.to_string();
        }
        if !words.is_ranked() {
            return Err(DecodeError::Unordered);
        }
        Ok(words)
    }

    /// Every slot outranks (or, for trailing empties, equals) the one after it.
    pub fn is_ranked(&self) -> bool {
        self.slots.windows(2).all(|pair| {
            let (a, b) = (&pair[0], &pair[1]);
            if b.is_empty() {
                return true;
            }
            !a.is_empty() && (a == b || outranks(a, b))
        })
    }
}

#[derive(Debug)]
pub enum DecodeError {
    Utf8(std::str::Utf8Error),
    SlotCount { expected: usize, got: usize },
    Unordered,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Utf8(e) => write!(f, "snapshot is not utf-8: {e}"),
            Self::SlotCount { expected, got } => {
                write!(f, "snapshot slot count mismatch: expected {expected}, got {got}")
            }
            Self::Unordered => write!(f, "snapshot slots are not in rank order"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Utf8(e) => Some(e),
            Self::SlotCount { .. } | Self::Unordered => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn words_of(items: &[&str]) -> Words {
        let mut words = Words::new();
        for item in items {
            words.insert(item);
        }
        words
    }

    fn slots(words: &Words) -> Vec<&str> {
        words.as_slice().iter().map(String::as_str).collect()
    }

    #[test]
    fn ranks_by_length_then_lexicographically() {
        assert!(outranks("elephant", "cat"));
        assert!(outranks("cat", "dog"));
        assert!(!outranks("dog", "cat"));
        assert!(!outranks("cat", "cat"));
        assert!(outranks("a", ""));
        assert!(!outranks("", ""));
    }

    #[test]
    fn cat_dog_elephant() {
        let words = words_of(&["cat", "dog", "elephant"]);
        assert_eq!(slots(&words), vec!["elephant", "cat", "dog"]);
    }

    #[test]
    fn shorter_word_is_dropped_when_full() {
        let mut words = words_of(&["cat", "dog", "elephant"]);
        assert!(!words.insert("ox"));
        assert_eq!(slots(&words), vec!["elephant", "cat", "dog"]);
    }

    #[test]
    fn equal_length_tie_goes_to_lexicographically_smaller() {
        let mut words = words_of(&["cat", "dog", "elephant"]);
        assert!(words.insert("ant"));
        assert_eq!(slots(&words), vec!["elephant", "ant", "cat"]);
    }

    #[test]
    fn longer_word_takes_first_slot_it_outranks() {
        let mut words = words_of(&["cat", "dog", "elephant"]);
        assert!(words.insert("zebra"));
        assert_eq!(slots(&words), vec!["elephant", "zebra", "cat"]);
    }

    #[test]
    fn duplicate_can_fill_an_empty_slot_and_raise_occupancy() {
        let mut words = words_of(&["elephant", "hello"]);
        assert_eq!(words.occupied(), 2);

        // Equal words do not outrank each other, so the copy lands behind the first one.
        assert!(words.insert("hello"));
        assert_eq!(words.occupied(), 3);
        assert_eq!(slots(&words), vec!["elephant", "hello", "hello"]);

        assert!(!words.insert("hello"));
        assert_eq!(words.occupied(), CAPACITY);
        assert_eq!(slots(&words), vec!["elephant", "hello", "hello"]);
    }

    #[test]
    fn capacity_is_bounded_and_last_slot_survives_failed_insert() {
        let mut words = words_of(&["aaaaaa", "bbbbbbb", "cccccccc", "ddddddddd"]);
        assert_eq!(words.occupied(), CAPACITY);
        let kth = words.as_slice()[CAPACITY - 1].clone();

        assert!(!words.insert("short"));
        assert_eq!(words.as_slice()[CAPACITY - 1], kth);
        assert_eq!(slots(&words), vec!["ddddddddd", "cccccccc", "bbbbbbb"]);
    }

    #[test]
    fn buffer_stays_ranked_after_every_insert() {
        let input = [
            "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
            "eleven", "twelve", "", "thirteen", "a", "zz", "eleven",
        ];
        let mut words = Words::new();
        for word in input {
            words.insert(word);
            assert!(words.is_ranked(), "not ranked after {word:?}: {words:?}");
        }
        assert_eq!(slots(&words), vec!["thirteen", "eleven", "eleven"]);
    }

    #[test]
    fn empty_word_is_a_no_op() {
        let mut words = Words::new();
        assert!(!words.insert(""));
        assert_eq!(words, Words::new());
    }

    #[test]
    fn separator_words_are_dropped() {
        let mut words = Words::new();
        assert!(!words.insert("two\nlines"));
        assert_eq!(words.occupied(), 0);
    }

    #[test]
    fn encode_keeps_empty_slots() {
        assert_eq!(Words::new().encode(), b"\n\n".to_vec());
        assert_eq!(words_of(&["hello"]).encode(), b"hello\n\n".to_vec());
        assert_eq!(
            words_of(&["cat", "dog", "elephant"]).encode(),
            b"elephant\ncat\ndog".to_vec()
        );
    }

    #[test]
    fn decode_restores_every_reachable_shape() {
        for words in [
            Words::new(),
            words_of(&["hello"]),
            words_of(&["hello", "hello"]),
            words_of(&["cat", "dog", "elephant"]),
        ] {
            assert_eq!(Words::decode(&words.encode()).unwrap(), words);
        }
    }

    #[test]
    fn decode_rejects_short_and_long_streams() {
        let err = Words::decode(b"elephant\ncat").unwrap_err();
        assert!(matches!(err, DecodeError::SlotCount { expected: 3, got: 2 }));

        let err = Words::decode(b"").unwrap_err();
        assert!(matches!(err, DecodeError::SlotCount { got: 1, .. }));

        let err = Words::decode(b"a\nb\nc\nd").unwrap_err();
        assert!(matches!(err, DecodeError::SlotCount { got: 4, .. }));
    }

    #[test]
    fn decode_rejects_invalid_utf8_and_bad_order() {
        assert!(matches!(
            Words::decode(&[0xff, b'\n', b'\n']).unwrap_err(),
            DecodeError::Utf8(_)
        ));
        assert!(matches!(
            Words::decode(b"cat\nelephant\n").unwrap_err(),
            DecodeError::Unordered
        ));
        assert!(matches!(
            Words::decode(b"\ncat\n").unwrap_err(),
            DecodeError::Unordered
        ));
    }
}
