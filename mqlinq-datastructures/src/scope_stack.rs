/// A stack of binding frames. Lookups search the innermost frame first, so
/// a name bound by a nested lambda shadows the same name bound further out.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeStack<K, V> {
    frames: Vec<Vec<(K, V)>>,
}

impl<K, V> Default for ScopeStack<K, V> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<K: PartialEq, V> ScopeStack<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, bindings: Vec<(K, V)>) {
        self.frames.push(bindings);
    }

    pub fn pop_frame(&mut self) -> Option<Vec<(K, V)>> {
        self.frames.pop()
    }

    pub fn lookup(&self, name: &K) -> Option<&V> {
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
