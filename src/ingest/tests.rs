use super::assemble::pair_steps;
use super::fields::decode_fields;
use super::*;
use crate::model::CaseStatus;

fn parse(document: &str) -> ParseOutcome {
    parse_test_cases(document, &ParseOptions::default()).expect("document should parse")
}

#[test]
fn simple_rows_map_to_cases_field_for_field() {
    let document = "id,title,steps,url\n1,Login,Open page,https://a.test\n2,Search,Type query,https://b.test\n";

    let outcome = parse(document);

    assert_eq!(outcome.headers, vec!["id", "title", "steps", "url"]);
    assert_eq!(outcome.cases.len(), 2);
    let first = &outcome.cases[0];
    assert_eq!(first.id, "1");
    assert_eq!(first.title, "Login");
    assert_eq!(first.steps, vec!["Open page"]);
    assert_eq!(first.url, "https://a.test");
    assert_eq!(first.status, CaseStatus::Pending);
    assert_eq!(outcome.cases[1].id, "2");
    assert_eq!(outcome.cases[1].steps, vec!["Type query"]);
}

#[test]
fn quoted_newline_is_reconstructed_into_one_logical_row() {
    let document = "id,title,steps\n1,Login,\"Open page\nClick button\"\n2,Other,Wait\n";

    let rows: Vec<_> = LogicalRows::new(document).collect();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].line, 2);
    assert_eq!(rows[0].text, "1,Login,\"Open page\nClick button\"");
    assert_eq!(rows[1].line, 4);
    assert_eq!(
        decode_fields(&rows[0].text),
        vec!["1", "Login", "Open page\nClick button"]
    );
}

#[test]
fn logical_rows_report_consumed_physical_lines() {
    let document = "id,title\n1,A\n\n2,B";
    let mut rows = LogicalRows::new(document);

    assert_eq!(rows.by_ref().count(), 2);
    assert_eq!(rows.physical_lines(), 4);
    assert!(rows.unterminated().is_none());
}

#[test]
fn doubled_quote_decodes_to_single_literal_quote() {
    let fields = decode_fields(r#"1,"Say ""hi"" now","a, b",plain"#);

    assert_eq!(fields, vec!["1", "Say \"hi\" now", "a, b", "plain"]);
}

#[test]
fn decoder_keeps_empty_fields_and_whitespace() {
    assert_eq!(decode_fields(",, x ,"), vec!["", "", " x ", ""]);
    assert_eq!(decode_fields(""), vec![""]);
}

#[test]
fn admission_requires_identifier_and_title() {
    let document = "id,title,steps\n,Suite header,\n,,\n4,,Orphan step\n3,Real case,Do it\n";

    let outcome = parse(document);

    assert_eq!(outcome.cases.len(), 1);
    assert_eq!(outcome.cases[0].id, "3");
    assert_eq!(outcome.stats.logical_rows, 4);
    assert_eq!(outcome.stats.skipped_missing_id, 2);
    assert_eq!(outcome.stats.skipped_missing_title, 1);
    assert_eq!(outcome.stats.admitted, 1);
}

#[test]
fn actions_pair_with_results_by_position() {
    let document = "id,title,steps_actions,steps_result\n1,Login,\"Open page\nClick button\",\"Page loads\nButton responds\"\n";

    let outcome = parse(document);

    assert_eq!(
        outcome.cases[0].steps,
        vec![
            "Open page -> Expected: Page loads",
            "Click button -> Expected: Button responds"
        ]
    );
}

#[test]
fn actions_without_results_column_stay_plain() {
    let outcome = parse("id,title,steps_actions\n1,Login,Open page\n");

    assert_eq!(outcome.cases[0].steps, vec!["Open page"]);
}

#[test]
fn pairing_is_driven_by_action_count() {
    let actions = vec!["A".to_string(), "B".to_string()];
    let one_result = vec!["R1".to_string()];
    let extra_results = vec!["R1".to_string(), "R2".to_string(), "R3".to_string()];

    assert_eq!(
        pair_steps(&actions, &one_result),
        vec!["A -> Expected: R1", "B"]
    );
    assert_eq!(
        pair_steps(&actions[..1], &extra_results),
        vec!["A -> Expected: R1"]
    );
}

#[test]
fn ordinal_prefix_and_trailing_quote_are_stripped() {
    let assembler = CaseAssembler::new("").expect("assembler");

    assert_eq!(
        assembler.split_steps("1. \"Navigate to login page\""),
        vec!["Navigate to login page"]
    );
    assert_eq!(
        assembler.split_steps("  2.Click login  \n\n12.   \"Verify\""),
        vec!["Click login", "Verify"]
    );
    assert_eq!(
        assembler.split_steps("Version 2. is not an ordinal"),
        vec!["Version 2. is not an ordinal"]
    );
}

#[test]
fn numbered_quoted_export_cells_normalize_end_to_end() {
    let document = "v2.id,title,steps_actions,steps_result\nTC-1,Login,\"1. \"\"Navigate to login page\"\"\n2. \"\"Enter username\"\"\",\"1. \"\"Login form shows\"\"\"\n";

    let outcome = parse(document);

    assert_eq!(
        outcome.cases[0].steps,
        vec![
            "Navigate to login page -> Expected: Login form shows",
            "Enter username"
        ]
    );
}

#[test]
fn header_only_input_is_malformed() {
    for document in ["id,title", "id,title\n", "id,title\n   \n", ""] {
        let result = parse_test_cases(document, &ParseOptions::default());
        assert!(
            matches!(result, Err(IngestError::MalformedInput { .. })),
            "expected malformed input for {document:?}"
        );
    }

    let result = parse_test_cases("id,title\n", &ParseOptions::default());
    assert!(matches!(
        result,
        Err(IngestError::MalformedInput { line_count: 1 })
    ));
}

#[test]
fn rows_without_admitted_cases_are_an_empty_success() {
    let outcome = parse("id,title\n,Section only\n");

    assert!(outcome.cases.is_empty());
    assert_eq!(outcome.stats.skipped_missing_id, 1);
}

#[test]
fn parsing_is_idempotent() {
    let document = "id,title,steps\n1,Login,\"Open\nClose\"\n,Suite,\n2,Logout,Click\n";

    assert_eq!(parse(document), parse(document));
}

#[test]
fn unterminated_tail_is_reported_and_prefix_kept() {
    let document = "id,title,steps\n1,Login,Open page\n2,Broken,\"Never closed\nstill open";

    let outcome = parse(document);

    assert_eq!(outcome.cases.len(), 1);
    assert_eq!(outcome.cases[0].id, "1");
    assert_eq!(
        outcome.stats.unterminated,
        Some(UnterminatedRow {
            line: 3,
            physical_lines: 2
        })
    );
    assert_eq!(outcome.stats.physical_lines, 4);

    let warnings = outcome.stats.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("line 3"));
}

#[test]
fn short_rows_default_and_long_rows_truncate() {
    let options = ParseOptions {
        default_url: "https://default.test".to_string(),
    };
    let document = "id,title,url,description\n1,Login\n2,Other,https://x.test,desc,EXTRA,MORE\n";

    let outcome = parse_test_cases(document, &options).expect("document should parse");

    assert_eq!(outcome.cases[0].url, "https://default.test");
    assert_eq!(outcome.cases[0].description, "");
    assert_eq!(outcome.cases[1].url, "https://x.test");
    assert_eq!(outcome.cases[1].description, "desc");
}

#[test]
fn duplicate_header_names_keep_first_column() {
    let headers = decode_headers("id, title ,title");
    let fields = FieldMap::from_row(&headers, "1,First,Second");

    assert_eq!(headers, vec!["id", "title", "title"]);
    assert_eq!(fields.get("title"), Some("First"));
    assert_eq!(fields.get("missing"), None);
    assert_eq!(fields.value("missing"), "");
}

#[test]
fn v2_identifier_takes_priority_over_plain_id() {
    let document = "id,v2.id,title,steps_actions\nS1,,Suite: Login,\nS1,TC-7,Valid login,Open page\n";

    let outcome = parse(document);

    assert_eq!(outcome.cases.len(), 1);
    assert_eq!(outcome.cases[0].id, "TC-7");
    assert_eq!(outcome.stats.skipped_missing_id, 1);
}

#[test]
fn empty_steps_get_placeholder() {
    let outcome = parse("id,title,steps\n1,No steps,\n");

    assert_eq!(outcome.cases[0].steps, vec![NO_STEPS_PLACEHOLDER]);
    assert_eq!(outcome.stats.placeholder_steps, 1);
    assert_eq!(outcome.stats.warnings().len(), 1);
}

#[test]
fn bom_and_crlf_line_endings_are_tolerated() {
    let document = "\u{feff}id,title,steps\r\n1,Login,\"Open page\r\nClick\"\r\n";

    let outcome = parse(document);

    assert_eq!(outcome.headers, vec!["id", "title", "steps"]);
    assert_eq!(outcome.cases[0].title, "Login");
    assert_eq!(outcome.cases[0].steps, vec!["Open page", "Click"]);
}

#[test]
fn identifier_and_title_are_trimmed_but_optional_text_is_raw() {
    let outcome = parse("id,title,preconditions\n  7 ,  Padded  , logged in \n");

    assert_eq!(outcome.cases[0].id, "7");
    assert_eq!(outcome.cases[0].title, "Padded");
    assert_eq!(outcome.cases[0].preconditions, " logged in ");
}
