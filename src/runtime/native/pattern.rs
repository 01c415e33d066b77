use dashmap::DashMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::{NativeReturn, bool_result, string_arg, string_result};
use crate::runtime::{
    Exception, NativeResult, Value, heap,
    mtable::{self, NativeEnv},
};

const CLASS: &str = "java/lang/String";

static PATTERNS: Lazy<DashMap<String, Regex>> = Lazy::new(DashMap::new);

fn syntax_error(pattern: &str, err: &regex::Error) -> Exception {
    let text = err.to_string();
    let reason = text
        .lines()
        .find_map(|l| l.trim().strip_prefix("error: "))
        .unwrap_or("invalid regular expression")
        .to_string();
    Exception::with_message(
        "java/util/regex/PatternSyntaxException",
        format!("{reason}\n{pattern}"),
    )
}

fn compile(source: &str, shown: &str) -> NativeResult<Regex> {
    if let Some(regex) = PATTERNS.get(source) {
        return Ok(regex.clone());
    }
    let regex = Regex::new(source).map_err(|e| syntax_error(shown, &e))?;
    PATTERNS.insert(source.to_string(), regex.clone());
    Ok(regex)
}

fn pattern(regex: &str) -> NativeResult<Regex> {
    compile(regex, regex)
}

fn illegal_argument(message: &str) -> Exception {
    Exception::with_message("java/lang/IllegalArgumentException", message)
}

/// Rewrites a Java replacement string (`$1`, `${name}`, `\$`) into the
/// `regex` crate's syntax.
fn replacement(template: &str, groups: usize) -> NativeResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('$') => out.push_str("$$"),
                Some(escaped) => out.push(escaped),
                None => return Err(illegal_argument("character to be escaped is missing")),
            },
            '$' => match chars.next() {
                Some('{') => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) if c.is_ascii_alphanumeric() => name.push(c),
                            _ => return Err(illegal_argument("named capturing group is missing trailing '}'")),
                        }
                    }
                    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                        return Err(illegal_argument("named capturing group has 0 length name"));
                    }
                    out.push_str(&format!("${{{name}}}"));
                }
                Some(d) if d.is_ascii_digit() => {
                    let mut group = d as usize - '0' as usize;
                    if group > groups {
                        return Err(Exception::with_message(
                            "java/lang/IndexOutOfBoundsException",
                            format!("No group {group}"),
                        ));
                    }
                    // take more digits while they still name a group
                    while let Some(next) = chars.peek().and_then(|c| c.to_digit(10)) {
                        let wider = group * 10 + next as usize;
                        if wider > groups {
                            break;
                        }
                        group = wider;
                        chars.next();
                    }
                    out.push_str(&format!("${{{group}}}"));
                }
                _ => return Err(illegal_argument("Illegal group reference")),
            },
            other => out.push(other),
        }
    }
    Ok(out)
}

/// `String.split(regex, limit)`.
fn split(input: &str, regex: &Regex, limit: i32) -> Vec<String> {
    let limited = limit > 0;
    let mut pieces: Vec<String> = Vec::new();
    let mut index = 0;
    for m in regex.find_iter(input) {
        if limited && pieces.len() >= limit as usize - 1 {
            break;
        }
        // a zero-width match at the start never yields a leading empty piece
        if index == 0 && m.start() == 0 && m.is_empty() {
            continue;
        }
        pieces.push(input[index..m.start()].to_string());
        index = m.end();
    }
    if index == 0 {
        return vec![input.to_string()];
    }
    pieces.push(input[index..].to_string());
    if limit == 0 {
        while pieces.last().is_some_and(String::is_empty) {
            pieces.pop();
        }
    }
    pieces
}

fn string_array(items: Vec<String>) -> NativeReturn {
    let refs = items.iter().map(|s| Some(heap::string_object(s))).collect();
    Ok(Some(Value::Ref(heap::ref_array_from(CLASS, refs))))
}

// public boolean matches(String regex)
fn matches(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = string_arg(&args[0])?;
    let regex = string_arg(&args[1])?;
    let anchored = compile(&format!(r"\A(?:{regex})\z"), &regex)?;
    bool_result(anchored.is_match(&this))
}

// public String[] split(String regex)
fn split_all(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = string_arg(&args[0])?;
    string_array(split(&this, &pattern(&string_arg(&args[1])?)?, 0))
}

// public String[] split(String regex, int limit)
fn split_limit(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    let this = string_arg(&args[0])?;
    let regex = pattern(&string_arg(&args[1])?)?;
    string_array(split(&this, &regex, args[2].as_int()?))
}

fn replace_with(args: &[Value], limit: usize) -> NativeReturn {
    let this = string_arg(&args[0])?;
    let regex = pattern(&string_arg(&args[1])?)?;
    let template = replacement(&string_arg(&args[2])?, regex.captures_len() - 1)?;
    string_result(&regex.replacen(&this, limit, template.as_str()))
}

// public String replaceAll(String regex, String replacement)
fn replace_all(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    replace_with(&args, 0)
}

// public String replaceFirst(String regex, String replacement)
fn replace_first(_: &mut NativeEnv, args: Vec<Value>) -> NativeReturn {
    replace_with(&args, 1)
}

pub(super) fn register_natives() {
    use mtable::register;

    register(CLASS, "matches", "(Ljava/lang/String;)Z", matches);
    register(CLASS, "split", "(Ljava/lang/String;)[Ljava/lang/String;", split_all);
    register(CLASS, "split", "(Ljava/lang/String;I)[Ljava/lang/String;", split_limit);
    register(
        CLASS,
        "replaceAll",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
        replace_all,
    );
    register(
        CLASS,
        "replaceFirst",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
        replace_first,
    );
}
