// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn render_to_string(table: &Table) -> String {
    let mut buf = Vec::new();
    table.render(&mut buf);
    String::from_utf8(buf).unwrap()
}

#[test]
fn empty_table_prints_nothing() {
    let table = Table::plain(vec![Column::left("NAME"), Column::left("STATUS")]);
    let out = render_to_string(&table);
    assert_eq!(out, "");
}

#[test]
fn single_row_single_column() {
    let mut table = Table::plain(vec![Column::left("NAME")]);
    table.row(vec!["hello".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "NAME");
    assert_eq!(lines[1], "hello");
}

#[test]
fn multi_column_left_alignment() {
    let mut table = Table::plain(vec![Column::left("ID"), Column::left("STATE")]);
    table.row(vec!["a1b2".into(), "waiting".into()]);
    table.row(vec!["c3".into(), "active".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "ID    STATE");
    assert_eq!(lines[1], "a1b2  waiting");
    assert_eq!(lines[2], "c3    active");
}

#[test]
fn right_alignment() {
    let mut table = Table::plain(vec![Column::left("ID"), Column::right("ATTEMPTS")]);
    table.row(vec!["a".into(), "1".into()]);
    table.row(vec!["bb".into(), "3".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[0], "ID  ATTEMPTS");
    assert_eq!(lines[1], "a          1");
    assert_eq!(lines[2], "bb         3");
}

#[test]
fn column_width_adapts_to_widest_cell() {
    let mut table = Table::plain(vec![Column::left("ID"), Column::left("STATE")]);
    table.row(vec!["a".into(), "ok".into()]);
    table.row(vec!["longvalue".into(), "error".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[0], "ID         STATE");
    assert_eq!(lines[1], "a          ok");
    assert_eq!(lines[2], "longvalue  error");
}

#[test]
fn max_width_truncates_long_values() {
    let mut table = Table::plain(vec![Column::left("ID").with_max(4), Column::left("NAME")]);
    table.row(vec!["abcdef".into(), "test".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[1], "abcd  test");
}

#[test]
fn min_width_enforces_minimum() {
    let mut table = Table::plain(vec![
        {
            let mut c = Column::left("X");
            c.min_width = Some(10);
            c
        },
        Column::left("Y"),
    ]);
    table.row(vec!["a".into(), "b".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[0], "X           Y");
    assert_eq!(lines[1], "a           b");
}

#[test]
fn last_column_no_trailing_padding() {
    let mut table = Table::plain(vec![Column::left("A"), Column::left("B")]);
    table.row(vec!["short".into(), "x".into()]);
    table.row(vec!["s".into(), "longvalue".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[1], "short  x");
    assert_eq!(lines[2], "s      longvalue");
}

#[test]
fn double_space_column_separator() {
    let mut table = Table::plain(vec![Column::left("A"), Column::left("B"), Column::left("C")]);
    table.row(vec!["1".into(), "2".into(), "3".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[1], "1  2  3");
}

#[test]
fn muted_style_applies_ansi_when_color_enabled() {
    let mut table = Table::colored(vec![Column::muted("ID")]);
    table.row(vec!["abc".into()]);
    let out = render_to_string(&table);

    assert!(out.contains("\x1b[38;5;240m"), "should have muted ANSI code in: {:?}", out);
    assert!(out.contains("\x1b[0m"), "should have reset code");
}

#[test]
fn status_style_applies_ansi_when_color_enabled() {
    let mut table = Table::colored(vec![Column::status("STATE")]);
    table.row(vec!["completed".into()]);
    let out = render_to_string(&table);

    assert!(out.contains("\x1b[32m"), "should have green ANSI code in: {:?}", out);
}

#[test]
fn no_ansi_when_no_color() {
    let mut table = Table::plain(vec![Column::muted("ID"), Column::status("STATE")]);
    table.row(vec!["abc".into(), "completed".into()]);
    let out = render_to_string(&table);

    assert!(!out.contains("\x1b["), "should have no ANSI codes in: {:?}", out);
}

#[test]
fn header_colorizes_when_enabled() {
    let mut table = Table::colored(vec![Column::left("ID")]);
    table.row(vec!["abc".into()]);
    let out = render_to_string(&table);
    assert!(out.lines().next().unwrap().contains("\x1b[38;5;74m"));
}

#[test]
fn right_aligned_non_last_column() {
    let mut table =
        Table::plain(vec![Column::left("NAME"), Column::right("ATTEMPTS"), Column::left("STATE")]);
    table.row(vec!["a.mp3".into(), "1".into(), "ok".into()]);
    table.row(vec!["bb.mp3".into(), "3".into(), "err".into()]);
    let out = render_to_string(&table);
    let lines: Vec<&str> = out.lines().collect();

    assert_eq!(lines[0], "NAME    ATTEMPTS  STATE");
    assert_eq!(lines[1], "a.mp3          1  ok");
    assert_eq!(lines[2], "bb.mp3         3  err");
}
