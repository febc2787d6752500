#[derive(Debug, PartialEq, Clone)]
pub enum Kind {
    // Literals
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    True,
    False,
    Null,

    Identifier(String),

    // Keywords
    New,
    InstanceOf,
    Matches,
    Between,

    // Delimiters
    ParenOpen,
    ParenClose,
    BraceOpen,
    BraceClose,
    BracketOpen,
    BracketClose,
    Comma,
    Dot,
    Colon,
    Hash,
    At,

    // Operators
    Plus,
    Minus,
    Star,
    Div,
    Mod,
    Power,
    Not,
    Assign,
    DoubleEqual,
    NotEqual,
    LT,
    LE,
    GT,
    GE,
    DoubleAnd,
    DoubleOr,
    Question,
    Elvis,
    SafeNavigation,

    // Collection processing
    Select,
    SelectFirst,
    SelectLast,
    Project,

    EOF,
}

impl Kind {
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Kind::True
                | Kind::False
                | Kind::Null
                | Kind::New
                | Kind::InstanceOf
                | Kind::Matches
                | Kind::Between
        )
    }

    /// Source form of the token, used in parse error messages.
    pub fn describe(&self) -> String {
        match self {
            Kind::Int(v) => v.to_string(),
            Kind::Long(v) => format!("{v}L"),
            Kind::Float(v) => format!("{v:?}f"),
            Kind::Double(v) => format!("{v:?}"),
            Kind::String(s) => format!("'{s}'"),
            Kind::Identifier(s) => s.clone(),
            Kind::EOF => "end of input".to_string(),
            other => other.symbol().to_string(),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            Kind::True => "true",
            Kind::False => "false",
            Kind::Null => "null",
            Kind::New => "new",
            Kind::InstanceOf => "instanceof",
            Kind::Matches => "matches",
            Kind::Between => "between",
            Kind::ParenOpen => "(",
            Kind::ParenClose => ")",
            Kind::BraceOpen => "{",
            Kind::BraceClose => "}",
            Kind::BracketOpen => "[",
            Kind::BracketClose => "]",
            Kind::Comma => ",",
            Kind::Dot => ".",
            Kind::Colon => ":",
            Kind::Hash => "#",
            Kind::At => "@",
            Kind::Plus => "+",
            Kind::Minus => "-",
            Kind::Star => "*",
            Kind::Div => "/",
            Kind::Mod => "%",
            Kind::Power => "^",
            Kind::Not => "!",
            Kind::Assign => "=",
            Kind::DoubleEqual => "==",
            Kind::NotEqual => "!=",
            Kind::LT => "<",
            Kind::LE => "<=",
            Kind::GT => ">",
            Kind::GE => ">=",
            Kind::DoubleAnd => "&&",
            Kind::DoubleOr => "||",
            Kind::Question => "?",
            Kind::Elvis => "?:",
            Kind::SafeNavigation => "?.",
            Kind::Select => "?[",
            Kind::SelectFirst => "^[",
            Kind::SelectLast => "$[",
            Kind::Project => "![",
            Kind::Int(_)
            | Kind::Long(_)
            | Kind::Float(_)
            | Kind::Double(_)
            | Kind::String(_)
            | Kind::Identifier(_)
            | Kind::EOF => "",
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Token {
    pub kind: Kind,
    pub position: std::ops::Range<usize>,
}
