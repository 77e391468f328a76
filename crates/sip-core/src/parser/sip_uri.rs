//! nom parser for sip/sips URIs
//!
//! ```text
//! scheme ":" [ user [ ":" password ] "@" ] host [ ":" port ] *( ";" param ) [ "?" headers ]
//! ```

use std::net::IpAddr;

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt, rest},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

use crate::error::{Error, Result};
use crate::parser::params::unquote;
use crate::types::param::Param;
use crate::types::uri::{Host, Scheme, Uri};

type ParamPair<'a> = (&'a str, Option<&'a str>);

fn is_user_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()%&=+$,".contains(c)
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()%[]/:&+$".contains(c)
}

fn scheme(input: &str) -> IResult<&str, &str> {
    terminated(
        take_while1(|c: char| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        char(':'),
    )(input)
}

fn userinfo(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    terminated(
        pair(
            take_while1(is_user_char),
            opt(preceded(char(':'), take_while(is_user_char))),
        ),
        char('@'),
    )(input)
}

fn ipv6_reference(input: &str) -> IResult<&str, &str> {
    delimited(
        char('['),
        take_while1(|c: char| c.is_ascii_hexdigit() || c == ':' || c == '.'),
        char(']'),
    )(input)
}

fn hostname(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '.')(input)
}

fn host(input: &str) -> IResult<&str, (&str, bool)> {
    alt((
        map(ipv6_reference, |h| (h, true)),
        map(hostname, |h| (h, false)),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |d: &str| d.parse::<u16>()))(input)
}

fn uri_param(input: &str) -> IResult<&str, ParamPair<'_>> {
    preceded(
        char(';'),
        pair(
            take_while1(is_param_char),
            opt(preceded(char('='), take_while(is_param_char))),
        ),
    )(input)
}

fn headers(input: &str) -> IResult<&str, &str> {
    preceded(char('?'), rest)(input)
}

/// Parse a complete sip/sips URI
pub fn parse_uri(input: &str) -> Result<Uri> {
    let trimmed = input.trim();
    let (_, (scheme_str, user_info, (host_str, bracketed), port, params, header_str)) =
        all_consuming(tuple((
            scheme,
            opt(userinfo),
            host,
            opt(port),
            many0(uri_param),
            opt(headers),
        )))(trimmed)
        .map_err(|e| Error::InvalidUri(format!("{}: {:?}", trimmed, e)))?;

    let scheme: Scheme = scheme_str.parse()?;

    let host = if bracketed {
        let addr: IpAddr = host_str
            .parse()
            .map_err(|_| Error::InvalidUri(format!("bad IPv6 reference in {}", trimmed)))?;
        Host::Address(addr)
    } else {
        match host_str.parse::<IpAddr>() {
            Ok(addr) => Host::Address(addr),
            Err(_) => Host::Domain(host_str.to_string()),
        }
    };

    let (user, password) = match user_info {
        Some((user, password)) => (Some(user.to_string()), password.map(str::to_string)),
        None => (None, None),
    };

    let parameters = params
        .into_iter()
        .map(|(name, value)| Param::new(name, value.map(unquote)))
        .collect();

    let headers = header_str
        .map(|h| {
            h.split('&')
                .filter(|kv| !kv.is_empty())
                .map(|kv| match kv.split_once('=') {
                    Some((k, v)) => (k.to_string(), v.to_string()),
                    None => (kv.to_string(), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(Uri {
        scheme,
        user,
        password,
        host,
        port,
        parameters,
        headers,
    })
}
