/// A node of a paradigm's trial state graph.
///
/// `Default` is the initial state (nothing presented yet). The graph is a
/// single main path walked with [`TaskState::next`]; the state without a
/// successor is terminal.
pub trait TaskState: Copy + Clone + PartialEq + Eq + Send + Sync + std::fmt::Debug + Default {
    fn next(&self) -> Option<Self>;
    fn name(&self) -> &'static str;

    fn is_initial(&self) -> bool {
        *self == Self::default()
    }

    fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}
