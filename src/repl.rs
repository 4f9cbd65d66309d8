//! Line commands for the interactive client.
//!
//! One command per line, words separated by whitespace. Parsing is kept
//! apart from execution so it can be tested without a server.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{AnnotationId, AnnotationPatch, BoundingBox, CategoryId, ItemId, NewAnnotation};

/// A parsed REPL command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Advance to the next item
    Next,
    /// Open a specific item
    Open(ItemId),
    /// List categories
    Categories,
    /// Select the category bound to a shortcut key
    Key(char),
    /// Select a category by id
    Use(CategoryId),
    Add(NewAnnotation),
    Set(AnnotationId, AnnotationPatch),
    Remove(AnnotationId),
    Select(Option<AnnotationId>),
    Undo,
    Redo,
    /// Print the open item's annotations
    List,
    Save,
    Skip,
    Progress,
    /// Write the effective configuration to the default config file
    SaveConfig,
    /// Write the open item's payload to a file
    Payload(PathBuf),
    /// Retry materializing the open item's payload
    Retry,
    Status,
    Reset,
    Help,
    Quit,
}

/// Errors produced while parsing a command line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command '{0}'")]
    Unknown(String),

    #[error("Missing argument: {0}")]
    Missing(&'static str),

    #[error("Invalid {what}: '{value}'")]
    Invalid { what: &'static str, value: String },

    #[error("Unexpected argument '{0}'")]
    Extra(String),
}

fn parse_arg<T: std::str::FromStr>(value: Option<&str>, what: &'static str) -> Result<T, ParseError> {
    let value = value.ok_or(ParseError::Missing(what))?;
    value.parse().map_err(|_| ParseError::Invalid {
        what,
        value: value.to_string(),
    })
}

fn no_more<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<(), ParseError> {
    match words.next() {
        Some(extra) => Err(ParseError::Extra(extra.to_string())),
        None => Ok(()),
    }
}

/// Parse `field=value` pairs into a patch.
fn parse_patch<'a>(words: impl Iterator<Item = &'a str>) -> Result<AnnotationPatch, ParseError> {
    let mut patch = AnnotationPatch::default();
    for word in words {
        let (field, value) = word.split_once('=').ok_or_else(|| ParseError::Invalid {
            what: "field=value",
            value: word.to_string(),
        })?;
        match field {
            "cat" | "category" => patch.category_id = Some(parse_arg(Some(value), "category id")?),
            "x" => patch.x_center = Some(parse_arg(Some(value), "x")?),
            "y" => patch.y_center = Some(parse_arg(Some(value), "y")?),
            "w" | "width" => patch.width = Some(parse_arg(Some(value), "width")?),
            "h" | "height" => patch.height = Some(parse_arg(Some(value), "height")?),
            _ => {
                return Err(ParseError::Invalid {
                    what: "field",
                    value: field.to_string(),
                });
            }
        }
    }
    if patch.is_empty() {
        return Err(ParseError::Missing("field=value"));
    }
    Ok(patch)
}

/// Parse one input line.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let mut words = line.split_whitespace();
    let head = words.next().ok_or(ParseError::Empty)?.to_lowercase();

    let command = match head.as_str() {
        "next" | "n" => Command::Next,
        "open" => Command::Open(parse_arg(words.next(), "item id")?),
        "cats" | "categories" => Command::Categories,
        "key" => {
            let key = words.next().ok_or(ParseError::Missing("key"))?;
            let mut chars = key.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Command::Key(c),
                _ => {
                    return Err(ParseError::Invalid {
                        what: "key",
                        value: key.to_string(),
                    });
                }
            }
        }
        "use" => Command::Use(parse_arg(words.next(), "category id")?),
        "add" => {
            let bbox = BoundingBox::new(
                parse_arg(words.next(), "x")?,
                parse_arg(words.next(), "y")?,
                parse_arg(words.next(), "width")?,
                parse_arg(words.next(), "height")?,
            );
            let mut new = NewAnnotation::new(bbox);
            if let Some(category) = words.next() {
                new = new.with_category(parse_arg(Some(category), "category id")?);
            }
            Command::Add(new)
        }
        "box" => {
            let bbox = BoundingBox::from_corners(
                parse_arg(words.next(), "x1")?,
                parse_arg(words.next(), "y1")?,
                parse_arg(words.next(), "x2")?,
                parse_arg(words.next(), "y2")?,
            );
            let mut new = NewAnnotation::new(bbox);
            if let Some(category) = words.next() {
                new = new.with_category(parse_arg(Some(category), "category id")?);
            }
            Command::Add(new)
        }
        "set" => {
            let id = parse_arg(words.next(), "annotation id")?;
            return Ok(Command::Set(id, parse_patch(words)?));
        }
        "rm" | "remove" => Command::Remove(parse_arg(words.next(), "annotation id")?),
        "sel" | "select" => match words.next() {
            Some("none") | None => Command::Select(None),
            Some(id) => Command::Select(Some(parse_arg(Some(id), "annotation id")?)),
        },
        "undo" | "u" => Command::Undo,
        "redo" | "r" => Command::Redo,
        "list" | "ls" => Command::List,
        "save" => Command::Save,
        "skip" => Command::Skip,
        "progress" => Command::Progress,
        "config" => match words.next() {
            Some("save") => Command::SaveConfig,
            Some(other) => {
                return Err(ParseError::Invalid {
                    what: "config action",
                    value: other.to_string(),
                });
            }
            None => return Err(ParseError::Missing("config action")),
        },
        "payload" => Command::Payload(PathBuf::from(
            words.next().ok_or(ParseError::Missing("path"))?,
        )),
        "retry" => Command::Retry,
        "status" => Command::Status,
        "reset" => Command::Reset,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => return Err(ParseError::Unknown(head)),
    };

    no_more(words)?;
    Ok(command)
}

/// Usage text printed by `help`.
pub const HELP: &str = "\
--- Commands ---
next                      advance to the next item
open <item>               open a specific item
cats                      list categories
key <c> | use <cat>       select a category by shortcut or id
add <x> <y> <w> <h> [cat] add a box (normalized center and size)
box <x1> <y1> <x2> <y2> [cat]  add a box from two corners
set <id> x=.. y=.. w=.. h=.. cat=..
rm <id>                   remove a box
sel <id> | sel none       select a box
undo | redo
list                      show boxes of the open item
save | skip               commit the open item
progress                  dataset progress
config save               write the current settings to the config file
payload <path>            write the image to a file
retry                     fetch the image again
status                    queue and history state
reset                     drop everything and start over
quit";
