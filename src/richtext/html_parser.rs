// HTML Parser
// A forgiving reader for review HTML: tags, attributes, text and character
// references. It never fails; broken markup becomes text or is closed implicitly.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HtmlNode {
    Element(HtmlElement),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlElement {
    /// Lowercased tag name
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<HtmlNode>,
}

impl HtmlElement {
    fn new(name: String, attributes: Vec<(String, String)>) -> Self {
        HtmlElement {
            name,
            attributes,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Start {
        name: String,
        attributes: Vec<(String, String)>,
        self_closing: bool,
    },
    End {
        name: String,
    },
    Text(String),
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Elements whose start implicitly closes an open paragraph
const CLOSES_PARAGRAPH: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "div", "figure", "blockquote",
    "pre", "table", "section", "article", "header", "footer", "hr",
];

/// Parse an HTML fragment (or a full page) into a node tree
pub fn parse_fragment(html: &str) -> Vec<HtmlNode> {
    let mut root: Vec<HtmlNode> = Vec::new();
    let mut stack: Vec<HtmlElement> = Vec::new();

    for token in tokenize(html) {
        match token {
            Token::Text(text) => append(&mut root, &mut stack, HtmlNode::Text(text)),
            Token::Start {
                name,
                attributes,
                self_closing,
            } => {
                if name == "li" {
                    close_open_list_item(&mut root, &mut stack);
                } else if CLOSES_PARAGRAPH.contains(&name.as_str())
                    && stack.last().is_some_and(|el| el.name == "p")
                {
                    pop_into_parent(&mut root, &mut stack);
                }

                let element = HtmlElement::new(name, attributes);
                if self_closing || VOID_ELEMENTS.contains(&element.name.as_str()) {
                    append(&mut root, &mut stack, HtmlNode::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Token::End { name } => {
                // Stray end tags are ignored
                if stack.iter().any(|el| el.name == name) {
                    while let Some(closed) = stack.last().map(|el| el.name == name) {
                        pop_into_parent(&mut root, &mut stack);
                        if closed {
                            break;
                        }
                    }
                }
            }
        }
    }

    while !stack.is_empty() {
        pop_into_parent(&mut root, &mut stack);
    }
    root
}

fn append(root: &mut Vec<HtmlNode>, stack: &mut [HtmlElement], node: HtmlNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.push(node),
    }
}

fn pop_into_parent(root: &mut Vec<HtmlNode>, stack: &mut Vec<HtmlElement>) {
    if let Some(element) = stack.pop() {
        append(root, stack, HtmlNode::Element(element));
    }
}

/// A new `<li>` closes the previous item of the same list
fn close_open_list_item(root: &mut Vec<HtmlNode>, stack: &mut Vec<HtmlElement>) {
    let boundary = stack
        .iter()
        .rposition(|el| el.name == "ul" || el.name == "ol");
    let open_item = stack.iter().rposition(|el| el.name == "li");
    if let Some(item_idx) = open_item
        && boundary.is_none_or(|list_idx| item_idx > list_idx)
    {
        while stack.len() > item_idx {
            pop_into_parent(root, stack);
        }
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.src[start..self.pos]
    }

    /// Skip past the next occurrence of `needle`, or to the end of input
    fn skip_past(&mut self, needle: &str) {
        match self.rest().find(needle) {
            Some(idx) => self.pos += idx + needle.len(),
            None => self.pos = self.src.len(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    !c.is_whitespace() && c != '>' && c != '/' && c != '='
}

fn tokenize(html: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cur = Cursor { src: html, pos: 0 };
    let mut text = String::new();

    while let Some(c) = cur.peek() {
        if c != '<' {
            text.push_str(cur.eat_while(|c| c != '<'));
            continue;
        }

        let rest = cur.rest();
        if rest.starts_with("<!--") {
            cur.pos += 4;
            cur.skip_past("-->");
        } else if rest.starts_with("<!") || rest.starts_with("<?") {
            cur.skip_past(">");
        } else if cur.peek_second() == Some('/')
            && rest[2..].starts_with(|c: char| c.is_ascii_alphabetic())
        {
            cur.pos += 2;
            let name = cur.eat_while(is_name_char).to_ascii_lowercase();
            cur.skip_past(">");
            flush_text(&mut tokens, &mut text);
            tokens.push(Token::End { name });
        } else if cur.peek_second().is_some_and(|c| c.is_ascii_alphabetic()) {
            let tag_start = cur.pos;
            cur.pos += 1;
            let name = cur.eat_while(is_name_char).to_ascii_lowercase();
            let Some((attributes, self_closing)) = read_attributes(&mut cur) else {
                // Unterminated tag: keep the rest as literal text
                cur.pos = tag_start;
                text.push_str(cur.rest());
                cur.pos = html.len();
                continue;
            };
            flush_text(&mut tokens, &mut text);

            let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing;
            tokens.push(Token::Start {
                name: name.clone(),
                attributes,
                self_closing,
            });
            if raw {
                let closing = format!("</{}", name);
                let body = cur.rest();
                let end = body
                    .to_ascii_lowercase()
                    .find(&closing)
                    .unwrap_or(body.len());
                if end > 0 {
                    tokens.push(Token::Text(body[..end].to_string()));
                }
                cur.pos += end;
                cur.skip_past(">");
                tokens.push(Token::End { name });
            }
        } else {
            cur.bump();
            text.push('<');
        }
    }

    flush_text(&mut tokens, &mut text);
    tokens
}

fn flush_text(tokens: &mut Vec<Token>, text: &mut String) {
    if !text.is_empty() {
        tokens.push(Token::Text(decode_entities(text)));
        text.clear();
    }
}

/// Read attributes up to and including the closing `>`.
/// Returns None when the input ends before the tag is closed.
fn read_attributes(cur: &mut Cursor<'_>) -> Option<(Vec<(String, String)>, bool)> {
    let mut attributes = Vec::new();
    loop {
        cur.eat_while(char::is_whitespace);
        match cur.peek()? {
            '>' => {
                cur.bump();
                return Some((attributes, false));
            }
            '/' => {
                cur.bump();
                if cur.peek() == Some('>') {
                    cur.bump();
                    return Some((attributes, true));
                }
                continue;
            }
            _ => {}
        }

        let name = cur.eat_while(is_name_char).to_ascii_lowercase();
        if name.is_empty() {
            // A lone '=' or similar; skip it
            cur.bump();
            continue;
        }
        cur.eat_while(char::is_whitespace);
        let mut value = String::new();
        if cur.peek() == Some('=') {
            cur.bump();
            cur.eat_while(char::is_whitespace);
            match cur.peek()? {
                quote @ ('"' | '\'') => {
                    cur.bump();
                    let raw = cur.eat_while(|c| c != quote);
                    cur.bump()?;
                    value = decode_entities(raw);
                }
                _ => {
                    let raw = cur.eat_while(|c| !c.is_whitespace() && c != '>');
                    value = decode_entities(raw);
                }
            }
        }
        attributes.push((name, value));
    }
}

/// Decode character references. Unknown references are kept as written.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        match rest[1..].find(';').filter(|&end| end <= 10) {
            Some(end) => match decode_reference(&rest[1..=end]) {
                Some(c) => {
                    out.push(c);
                    rest = &rest[end + 2..];
                }
                None => {
                    out.push('&');
                    rest = &rest[1..];
                }
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code).filter(|&c| c != '\0');
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

impl fmt::Display for HtmlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HtmlNode::Text(text) => write!(f, "{:?}", text),
            HtmlNode::Element(el) => {
                write!(f, "<{}>", el.name)?;
                for child in &el.children {
                    write!(f, "{}", child)?;
                }
                write!(f, "</{}>", el.name)
            }
        }
    }
}
