pub mod line;
pub mod tokenize;
pub mod types;

pub use line::{parse, parse_line};
pub use tokenize::{
    Param, after_keyword, command_word, keyword_ws_found, parameter, parameters, set_items,
    strip_quotes,
};
pub use types::{ChainOperator, CommandList, CommandNode, Cursor};
