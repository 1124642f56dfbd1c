//! `!fail`: a random quote, one line per second.

use std::time::Duration;

use fossbot_sdk::dispatch::BotContext;
use fossbot_sdk::message::ParsedMessage;
use rand::seq::SliceRandom;

use crate::output::{self, color};

const QUOTE_LINE_DELAY: Duration = Duration::from_secs(1);

/// Colored run of text.
type Segment = (&'static str, &'static str);

/// Each quote is a list of lines, each line a list of segments.
static QUOTES: &[&[&[Segment]]] = &[
    &[
        &[(color::TEAL, "I mpala einai strogili")],
        &[(color::TEAL, "to gipedo einai paralilogramo")],
        &[(color::TEAL, " 11 autoi, 11 emeis sinolo 23")],
        &[(color::TEAL, "kai tha boun kai 3 allages apo kathe omada sinolo 29!")],
    ],
    &[&[(color::LTCYAN, "fail indeed")]],
    &[&[(color::PINK, "total")], &[(color::PINK, "failure")]],
    &[
        &[(color::LTGREEN, "popo, ti eipes twra")],
        &[(color::LTGREEN, "emeina me anoixto to... "), (color::RED, "programma")],
    ],
];

fn render(quote: &[&[Segment]]) -> Vec<String> {
    quote
        .iter()
        .map(|line| line.iter().map(|(c, text)| format!("{c}{text}")).collect())
        .collect()
}

pub async fn fail(ctx: BotContext, msg: ParsedMessage) -> anyhow::Result<()> {
    let lines = match QUOTES.choose(&mut rand::thread_rng()) {
        Some(quote) => render(quote),
        None => return Ok(()),
    };
    output::say_lines(&ctx, msg.reply_target(), lines, QUOTE_LINE_DELAY).await
}
