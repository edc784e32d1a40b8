//! Inline `style` attribute parsing.
//!
//! Only the handful of properties that map to native run or paragraph
//! formatting are read; everything else is skipped.

use cssparser::{ParseError, Parser, ParserInput, Token};

/// Paragraph alignment taken from `text-align`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

/// Formatting flags read from a `style` attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub align: Option<TextAlign>,
}

impl InlineStyle {
    /// Parse a style attribute value (`font-weight: bold; text-align: center`).
    pub fn parse(style_attr: &str) -> Self {
        let mut input = ParserInput::new(style_attr);
        let mut parser = Parser::new(&mut input);
        parse_declaration_block(&mut parser)
    }
}

fn parse_declaration_block<'i>(input: &mut Parser<'i, '_>) -> InlineStyle {
    let mut style = InlineStyle::default();

    loop {
        input.skip_whitespace();
        if input.is_exhausted() {
            break;
        }

        let result: Result<(), ParseError<'i, ()>> = input.try_parse(|i| {
            let property = match i.next()? {
                Token::Ident(name) => name.to_ascii_lowercase(),
                _ => return Err(i.new_custom_error(())),
            };
            i.skip_whitespace();
            match i.next()? {
                Token::Colon => {}
                _ => return Err(i.new_custom_error(())),
            }
            i.skip_whitespace();

            let mut values: Vec<Token> = Vec::new();
            loop {
                match i.next() {
                    Ok(Token::Semicolon) | Err(_) => break,
                    Ok(t) => values.push(t.clone()),
                }
            }

            apply_property(&mut style, &property, &values);
            Ok(())
        });

        if result.is_err() {
            // Skip to the next semicolon to recover.
            loop {
                match input.next() {
                    Ok(Token::Semicolon) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        }
    }

    style
}

fn apply_property(style: &mut InlineStyle, property: &str, values: &[Token]) {
    match property {
        "font-weight" => {
            if let Some(bold) = parse_font_weight(values) {
                style.bold = bold;
            }
        }
        "font-style" => {
            if let Some(italic) = parse_font_style(values) {
                style.italic = italic;
            }
        }
        "text-decoration" | "text-decoration-line" => {
            if has_ident(values, "underline") {
                style.underline = true;
            }
        }
        "text-align" => {
            if let Some(align) = parse_text_align(values) {
                style.align = Some(align);
            }
        }
        _ => {}
    }
}

/// `Some(true)` for bold weights, `Some(false)` for explicit normal weights.
fn parse_font_weight(values: &[Token]) -> Option<bool> {
    for token in values {
        match token {
            Token::Ident(name) => match name.to_ascii_lowercase().as_str() {
                "bold" | "bolder" => return Some(true),
                "normal" | "lighter" => return Some(false),
                _ => continue,
            },
            Token::Number {
                int_value: Some(weight),
                ..
            } => return Some(*weight >= 700),
            _ => continue,
        }
    }
    None
}

fn parse_font_style(values: &[Token]) -> Option<bool> {
    for token in values {
        if let Token::Ident(name) = token {
            match name.to_ascii_lowercase().as_str() {
                "italic" | "oblique" => return Some(true),
                "normal" => return Some(false),
                _ => continue,
            }
        }
    }
    None
}

fn parse_text_align(values: &[Token]) -> Option<TextAlign> {
    for token in values {
        if let Token::Ident(name) = token {
            match name.to_ascii_lowercase().as_str() {
                "left" | "start" => return Some(TextAlign::Left),
                "right" | "end" => return Some(TextAlign::Right),
                "center" => return Some(TextAlign::Center),
                "justify" => return Some(TextAlign::Justify),
                _ => continue,
            }
        }
    }
    None
}

fn has_ident(values: &[Token], wanted: &str) -> bool {
    values
        .iter()
        .any(|t| matches!(t, Token::Ident(name) if name.eq_ignore_ascii_case(wanted)))
}
