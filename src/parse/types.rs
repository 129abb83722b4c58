//! Types produced by the line parser and consumed by the execution engine.

/// How a statement relates to the one before it on the same logical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChainOperator {
    /// Starts a new statement.
    #[default]
    None,
    /// `&&`: run only if the previous statement succeeded
    OnSuccess,
    /// `||`: run only if the previous statement failed
    OnFailure,
    /// `&`: run unconditionally as part of the same statement
    Always,
}

impl ChainOperator {
    /// The operator's batch syntax.
    pub fn as_str(self) -> &'static str {
        match self {
            ChainOperator::None => "",
            ChainOperator::OnSuccess => "&&",
            ChainOperator::OnFailure => "||",
            ChainOperator::Always => "&",
        }
    }

    /// Whether a node with this operator should run, given the errorlevel
    /// left behind by the previous statement.
    pub fn permits(self, errorlevel: i32) -> bool {
        match self {
            ChainOperator::OnSuccess => errorlevel == 0,
            ChainOperator::OnFailure => errorlevel != 0,
            ChainOperator::None | ChainOperator::Always => true,
        }
    }
}

/// One parsed statement.
///
/// Block structure is never stored as a tree: every node inside a `( … )`
/// group carries a `bracket_depth` one greater than the group's owner, and
/// each `)` produces a close node (`text == None`) at the inner depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    /// Statement text, or `None` for the close node of a bracket group.
    pub text: Option<String>,
    pub bracket_depth: usize,
    pub chain: ChainOperator,
    /// Redirection text (`> out.txt 2>&1`), passed through to the executor.
    pub redirects: String,
}

impl CommandNode {
    pub fn statement(text: impl Into<String>, bracket_depth: usize) -> Self {
        Self {
            text: Some(text.into()),
            bracket_depth,
            chain: ChainOperator::None,
            redirects: String::new(),
        }
    }

    pub fn close(bracket_depth: usize) -> Self {
        Self {
            text: None,
            bracket_depth,
            chain: ChainOperator::None,
            redirects: String::new(),
        }
    }

    pub fn with_chain(mut self, chain: ChainOperator) -> Self {
        self.chain = chain;
        self
    }

    pub fn with_redirects(mut self, redirects: impl Into<String>) -> Self {
        self.redirects = redirects.into();
        self
    }

    pub fn is_close(&self) -> bool {
        self.text.is_none()
    }
}

/// A parsed logical line: an immutable, forward-only sequence of nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandList {
    nodes: Vec<CommandNode>,
}

impl CommandList {
    pub fn new(nodes: Vec<CommandNode>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[CommandNode] {
        &self.nodes
    }

    /// A cursor positioned at the first node.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor { list: self, pos: 0 }
    }
}

impl From<Vec<CommandNode>> for CommandList {
    fn from(nodes: Vec<CommandNode>) -> Self {
        Self::new(nodes)
    }
}

/// A position in a [`CommandList`].
///
/// Cursors are cheap copies; operations that consume statements take
/// `&mut Cursor` and leave it at the first node they did not consume.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    list: &'a CommandList,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// The node under the cursor, or `None` once past the last node.
    pub fn current(&self) -> Option<&'a CommandNode> {
        self.list.nodes.get(self.pos)
    }

    /// Step to the next node. Advancing an end cursor stays at the end.
    pub fn advance(&mut self) {
        if self.pos < self.list.nodes.len() {
            self.pos += 1;
        }
    }

    /// Bracket depth of the current node.
    pub fn depth(&self) -> Option<usize> {
        self.current().map(|node| node.bracket_depth)
    }

    pub fn is_end(&self) -> bool {
        self.pos >= self.list.nodes.len()
    }

    /// Jump past the last node. Used by statements that abandon the rest of
    /// the line (`GOTO`, `EXIT`).
    pub fn finish(&mut self) {
        self.pos = self.list.nodes.len();
    }

    pub fn position(&self) -> usize {
        self.pos
    }
}

impl PartialEq for Cursor<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.list, other.list) && self.pos == other.pos
    }
}

impl Eq for Cursor<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_walks_and_stops_at_end() {
        let list = CommandList::new(vec![
            CommandNode::statement("echo a", 0),
            CommandNode::statement("echo b", 1),
            CommandNode::close(1),
        ]);
        let mut cursor = list.cursor();
        assert_eq!(cursor.depth(), Some(0));
        cursor.advance();
        assert_eq!(cursor.current().and_then(|n| n.text.as_deref()), Some("echo b"));
        cursor.advance();
        assert!(cursor.current().is_some_and(CommandNode::is_close));
        cursor.advance();
        assert!(cursor.is_end());
        assert_eq!(cursor.current(), None);
        cursor.advance();
        assert!(cursor.is_end());
    }

    #[test]
    fn finish_jumps_to_end() {
        let list = CommandList::new(vec![
            CommandNode::statement("goto x", 0),
            CommandNode::statement("echo never", 0),
        ]);
        let mut cursor = list.cursor();
        cursor.finish();
        assert!(cursor.is_end());
    }

    #[test]
    fn chain_permits() {
        assert!(ChainOperator::OnSuccess.permits(0));
        assert!(!ChainOperator::OnSuccess.permits(1));
        assert!(ChainOperator::OnFailure.permits(2));
        assert!(!ChainOperator::OnFailure.permits(0));
        assert!(ChainOperator::Always.permits(5));
    }

    #[test]
    fn cursors_compare_by_list_and_position() {
        let list = CommandList::new(vec![CommandNode::statement("rem", 0)]);
        let other = list.clone();
        assert_eq!(list.cursor(), list.cursor());
        assert_ne!(list.cursor(), other.cursor());
    }
}
