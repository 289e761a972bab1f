//! CLI integration tests for jsonapi-include binary.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("jsonapi-include"));
    for var in [
        "JSONAPI_MAX_INCLUDE_PATHS",
        "JSONAPI_MAX_RELATIONS",
        "JSONAPI_STRICT_INCLUDES",
        "JSONAPI_DEFAULT_PAGE_LIMIT",
        "JSONAPI_MAX_PAGE_LIMIT",
        "JSONAPI_MAX_SORTS",
        "JSONAPI_BASE_URL",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// Helper to create a temp input file
fn write_temp_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

const DECLARATION: &str = r#"{
    "resources": {
        "actors": {
            "relationships": {"movies": {"type": "movies"}},
            "sortable": ["name"],
            "filterable": {"name": ["exact", "icontains"]}
        },
        "movies": {
            "relationships": {"actors": {"type": "actors"}}
        }
    }
}"#;

const DATASET: &str = r#"{
    "actors": [
        {"id": "1", "attributes": {"name": "Al"},
         "relationships": {"movies": [{"type": "movies", "id": "10"}, {"type": "movies", "id": "11"}]}},
        {"id": "2", "attributes": {"name": "Bo"},
         "relationships": {"movies": [{"type": "movies", "id": "10"}]}}
    ],
    "movies": [
        {"id": "10", "attributes": {"title": "Heat"},
         "relationships": {"actors": [{"type": "actors", "id": "1"}, {"type": "actors", "id": "2"}]}},
        {"id": "11", "attributes": {"title": "Ronin"},
         "relationships": {"actors": [{"type": "actors", "id": "1"}]}}
    ]
}"#;

struct Fixture {
    dir: TempDir,
    declaration: std::path::PathBuf,
    data: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let declaration = write_temp_file(&dir, "declaration.json", DECLARATION);
    let data = write_temp_file(&dir, "data.json", DATASET);
    Fixture {
        dir,
        declaration,
        data,
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

mod render_command {
    use super::*;

    fn render(f: &Fixture, extra: &[&str]) -> Command {
        let mut cmd = cmd();
        cmd.args([
            "render",
            f.declaration.to_str().unwrap(),
            "--data",
            f.data.to_str().unwrap(),
            "--type",
            "actors",
        ])
        .args(extra);
        cmd
    }

    #[test]
    fn collection_with_include() {
        let f = fixture();
        let output = render(&f, &["--query", "include=movies"])
            .assert()
            .success()
            .get_output()
            .clone();

        let document = stdout_json(&output);
        assert_eq!(document["data"].as_array().unwrap().len(), 2);
        let included: Vec<&str> = document["included"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect();
        assert_eq!(included, vec!["10", "11"]);
        assert_eq!(document["jsonapi"]["version"], "1.0");
        assert_eq!(
            document["links"]["self"],
            "http://localhost/actors?include=movies"
        );
    }

    #[test]
    fn single_resource() {
        let f = fixture();
        let output = render(&f, &["--id", "2", "--query", "include=movies.actors"])
            .assert()
            .success()
            .get_output()
            .clone();

        let document = stdout_json(&output);
        assert_eq!(document["data"]["id"], "2");
        // actors:1 arrives through movies:10, actors:2 is primary data
        let included: Vec<String> = document["included"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| format!("{}:{}", r["type"].as_str().unwrap(), r["id"].as_str().unwrap()))
            .collect();
        assert_eq!(included, vec!["movies:10", "actors:1"]);
    }

    #[test]
    fn render_with_pretty() {
        let f = fixture();
        render(&f, &["--pretty"])
            .assert()
            .success()
            // Pretty output has newlines and indentation
            .stdout(predicate::str::contains("{\n"));
    }

    #[test]
    fn render_with_output_file() {
        let f = fixture();
        let output = f.dir.path().join("document.json");

        render(&f, &["--output", output.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());

        let content = fs::read_to_string(&output).unwrap();
        assert!(content.contains(r#""type":"actors""#));
    }

    #[test]
    fn render_with_url_and_paging() {
        let f = fixture();
        let output = render(
            &f,
            &[
                "--url",
                "http://api.test/actors?sort=-name&page[limit]=1",
            ],
        )
        .assert()
        .success()
        .get_output()
        .clone();

        let document = stdout_json(&output);
        assert_eq!(document["data"][0]["id"], "2");
        assert_eq!(document["meta"]["total"], 2);
        assert!(document["links"]["next"]
            .as_str()
            .unwrap()
            .starts_with("http://api.test/actors?"));
    }

    #[test]
    fn settings_file_limits_depth() {
        let f = fixture();
        let config = write_temp_file(&f.dir, "jsonapi.toml", "max_relations = 1\n");

        render(
            &f,
            &[
                "--config",
                config.to_str().unwrap(),
                "--query",
                "include=movies.actors",
            ],
        )
        .assert()
        .code(1)
        .stdout(predicate::str::contains("InvalidIncludeParam"));
    }

    #[test]
    fn env_override_applies() {
        let f = fixture();
        render(&f, &["--query", "include=movies.actors"])
            .env("JSONAPI_MAX_RELATIONS", "1")
            .assert()
            .code(1)
            .stdout(predicate::str::contains("max depth of 1"));
    }
}

mod request_errors {
    use super::*;

    fn render_query(f: &Fixture, query: &str) -> std::process::Output {
        cmd()
            .args([
                "render",
                f.declaration.to_str().unwrap(),
                "--data",
                f.data.to_str().unwrap(),
                "--type",
                "actors",
                "--query",
                query,
            ])
            .assert()
            .code(1)
            .get_output()
            .clone()
    }

    #[test]
    fn aggregate_include_errors() {
        let f = fixture();
        let document = stdout_json(&render_query(&f, "include=bogus1,bogus2"));
        let errors = document["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["code"], "InvalidIncludeParam");
        assert_eq!(errors[0]["source"]["parameter"], "include");
    }

    #[test]
    fn errors_from_several_parameters() {
        let f = fixture();
        let document = stdout_json(&render_query(
            &f,
            "include=bogus&sort=title&filter[name__gt]=A&page[limit]=0",
        ));
        let codes: Vec<&str> = document["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["code"].as_str().unwrap())
            .collect();
        assert_eq!(
            codes,
            vec![
                "InvalidIncludeParam",
                "InvalidSortParam",
                "InvalidFilterParam",
                "InvalidPageParam"
            ]
        );
    }

    #[test]
    fn unknown_id_is_not_found() {
        let f = fixture();
        cmd()
            .args([
                "render",
                f.declaration.to_str().unwrap(),
                "--data",
                f.data.to_str().unwrap(),
                "--type",
                "actors",
                "--id",
                "99",
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("404 Not Found"));
    }
}

mod plan_command {
    use super::*;

    #[test]
    fn plan_lists_directives_in_order() {
        let f = fixture();
        let output = cmd()
            .args([
                "plan",
                f.declaration.to_str().unwrap(),
                "--type",
                "actors",
                "--query",
                "include=movies.actors,movies",
            ])
            .assert()
            .success()
            .get_output()
            .clone();

        let plan = stdout_json(&output);
        let paths: Vec<&str> = plan["directives"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["path"].as_str().unwrap())
            .collect();
        assert_eq!(paths, vec!["movies", "movies.actors"]);
        assert_eq!(plan["directives"][1]["resource_type"], "actors");
        assert_eq!(plan["defaulted"], false);
    }

    #[test]
    fn plan_rejects_deep_path() {
        let f = fixture();
        cmd()
            .args([
                "plan",
                f.declaration.to_str().unwrap(),
                "--type",
                "actors",
                "--query",
                "include=a.b.c.d",
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("exceeds the max depth of 3"));
    }
}

mod error_handling {
    use super::*;

    #[test]
    fn declaration_not_found() {
        let f = fixture();
        cmd()
            .args([
                "render",
                "/nonexistent/declaration.json",
                "--data",
                f.data.to_str().unwrap(),
                "--type",
                "actors",
            ])
            .assert()
            .code(3)
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn invalid_json_declaration() {
        let f = fixture();
        let bad = write_temp_file(&f.dir, "bad.json", r#"{ not valid json"#);

        cmd()
            .args(["plan", bad.to_str().unwrap(), "--type", "actors"])
            .assert()
            .code(2);
    }

    #[test]
    fn unknown_target_type() {
        let f = fixture();
        let bad = write_temp_file(
            &f.dir,
            "bad.json",
            r#"{"resources": {"actors": {"relationships": {"movies": {"type": "films"}}}}}"#,
        );

        cmd()
            .args(["plan", bad.to_str().unwrap(), "--type", "actors"])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("films"));
    }

    #[test]
    fn unknown_resource_type() {
        let f = fixture();
        cmd()
            .args([
                "plan",
                f.declaration.to_str().unwrap(),
                "--type",
                "directors",
            ])
            .assert()
            .code(2)
            .stderr(predicate::str::contains("directors"));
    }

    #[test]
    fn dangling_linkage_is_a_server_error() {
        let f = fixture();
        let data = write_temp_file(
            &f.dir,
            "dangling.json",
            r#"{"actors": [{"id": "1", "relationships": {"movies": [{"type": "movies", "id": "404"}]}}]}"#,
        );

        cmd()
            .args([
                "render",
                f.declaration.to_str().unwrap(),
                "--data",
                data.to_str().unwrap(),
                "--type",
                "actors",
                "--query",
                "include=movies",
            ])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("500 Internal Server Error"));
    }

    #[test]
    fn missing_data_flag() {
        let f = fixture();
        cmd()
            .args([
                "render",
                f.declaration.to_str().unwrap(),
                "--type",
                "actors",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--data"));
    }

    #[test]
    fn query_conflicts_with_url() {
        let f = fixture();
        cmd()
            .args([
                "render",
                f.declaration.to_str().unwrap(),
                "--data",
                f.data.to_str().unwrap(),
                "--type",
                "actors",
                "--query",
                "include=movies",
                "--url",
                "http://api.test/actors",
            ])
            .assert()
            .failure();
    }
}

mod lint_command {
    use super::*;

    #[test]
    fn lint_valid_declaration() {
        let f = fixture();
        cmd()
            .args(["lint", f.declaration.to_str().unwrap()])
            .assert()
            .success()
            .stdout(predicate::str::contains("all passed"));
    }

    #[test]
    fn lint_reports_errors() {
        let f = fixture();
        write_temp_file(
            &f.dir,
            "broken.json",
            r#"{"resources": {"actors": {"relationships": {"movies": {"type": "films"}}}}}"#,
        );

        cmd()
            .args(["lint", f.dir.path().to_str().unwrap()])
            .assert()
            .code(1)
            .stdout(predicate::str::contains("E003"));
    }

    #[test]
    fn lint_json_format() {
        let f = fixture();
        let output = cmd()
            .args([
                "lint",
                f.declaration.to_str().unwrap(),
                "--format",
                "json",
            ])
            .assert()
            .success()
            .get_output()
            .clone();

        let result = stdout_json(&output);
        assert_eq!(result["files_checked"], 1);
        assert_eq!(result["results"][0]["status"], "ok");
    }

    #[test]
    fn lint_strict_fails_on_warnings() {
        let f = fixture();
        let path = write_temp_file(
            &f.dir,
            "warn.json",
            r#"{"resources": {"actors": {"filterable": {"name": []}}}}"#,
        );

        cmd()
            .args(["lint", path.to_str().unwrap()])
            .assert()
            .success();
        cmd()
            .args(["lint", path.to_str().unwrap(), "--strict"])
            .assert()
            .code(1);
    }

    #[test]
    fn lint_missing_path() {
        cmd()
            .args(["lint", "/nonexistent/dir"])
            .assert()
            .code(2);
    }
}

mod help_output {
    use super::*;

    #[test]
    fn help_flag() {
        cmd()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("render"))
            .stdout(predicate::str::contains("plan"))
            .stdout(predicate::str::contains("lint"));
    }

    #[test]
    fn version_flag() {
        cmd()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("jsonapi-include"));
    }
}
