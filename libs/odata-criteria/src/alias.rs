/// Hands out table aliases (`E0`, `E1`, ...) for one statement.
///
/// Numbers are never reused, even when the structure that asked for an
/// alias is dropped afterwards.
#[derive(Debug, Clone)]
pub struct AliasBuilder {
    prefix: char,
    next: usize,
}

impl Default for AliasBuilder {
    fn default() -> Self {
        Self::new('E')
    }
}

impl AliasBuilder {
    pub fn new(prefix: char) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn next_alias(&mut self) -> String {
        let alias = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        alias
    }

    /// Number of aliases handed out so far.
    pub fn issued(&self) -> usize {
        self.next
    }
}
