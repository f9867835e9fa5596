use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn examforge() -> Command {
    Command::cargo_bin("examforge").unwrap()
}

fn write_tos(dir: &Path) -> std::path::PathBuf {
    // remember-only split keeps the heuristic classifier predictable
    let path = dir.join("tos.yaml");
    fs::write(
        &path,
        r#"
version: 1
course: "General Biology"
period: "1st Grading"
school_year: "2026-2027"
total_items: 4
topics:
  - name: "Cells"
    weight: 100
level_split:
  remember: 100
  understand: 0
  apply: 0
  analyze: 0
  evaluate: 0
  create: 0
difficulty_split: [100, 0, 0]
"#,
    )
    .unwrap();
    path
}

fn write_questions(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("questions.yaml");
    fs::write(
        &path,
        r#"
- id: q-nucleus
  topic: "Cells"
  text: "Name the organelle that contains the genetic material."
  body:
    type: multiple_choice
    choices: ["Nucleus", "Ribosome", "Vacuole", "Lysosome"]
    correct: 0
- id: q-mito
  topic: "Cells"
  text: "Identify the organelle known as the powerhouse of the cell."
  body:
    type: fill_blank
    answer: "Mitochondrion"
- id: q-wall
  topic: "Cells"
  text: "State one function of the cell wall in plants."
  body:
    type: essay
    guideline: "Mention structural support or protection."
- id: q-truefalse
  topic: "Cells"
  text: "List the statement's truth: all cells have a nucleus."
  body:
    type: true_false
    answer: false
"#,
    )
    .unwrap();
    path
}

#[test]
fn full_workflow_init_to_export() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bank.db");
    let tos = write_tos(dir.path());
    let questions = write_questions(dir.path());

    examforge()
        .current_dir(dir.path())
        .args(["init", "--config"])
        .arg(dir.path().join("sample.yaml"))
        .arg("--db")
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("initialized bank"));

    examforge()
        .args(["import", "--approve", "--db"])
        .arg(&db)
        .arg(&questions)
        .assert()
        .success()
        .stderr(contains("imported 4 questions"));

    // heuristic classification (no API key in the environment)
    examforge()
        .env_remove("OPENAI_API_KEY")
        .args(["classify", "--db"])
        .arg(&db)
        .assert()
        .success()
        .stderr(contains("classified 4 questions"));

    examforge()
        .args(["tos", "--id", "bp-1", "--db"])
        .arg(&db)
        .arg("--config")
        .arg(&tos)
        .assert()
        .success();

    examforge()
        .args([
            "generate",
            "--blueprint",
            "bp-1",
            "--id",
            "test-1",
            "--title",
            "Unit Test",
            "--db",
        ])
        .arg(&db)
        .assert()
        .success();

    let out = dir.path().join("paper.md");
    examforge()
        .args(["export", "--test", "test-1", "--format", "md", "--db"])
        .arg(&db)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let paper = fs::read_to_string(&out).unwrap();
    assert!(paper.contains("# Unit Test"));
    assert!(!paper.contains("Answer Key"));

    let keyed = dir.path().join("paper-key.md");
    examforge()
        .args(["export", "--test", "test-1", "--format", "md", "--with-key", "--db"])
        .arg(&db)
        .arg("--out")
        .arg(&keyed)
        .assert()
        .success();
    assert!(fs::read_to_string(&keyed).unwrap().contains("Answer Key"));

    examforge().args(["stats", "--db"]).arg(&db).assert().success();
}

#[test]
fn student_role_is_denied() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bank.db");
    let questions = write_questions(dir.path());

    examforge()
        .args(["import", "--role", "student", "--db"])
        .arg(&db)
        .arg(&questions)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("denied"));
}

#[test]
fn bad_config_exits_two() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bank.db");
    let bad = dir.path().join("bad.yaml");
    fs::write(
        &bad,
        r#"
version: 1
course: "Biology"
period: "1st"
school_year: "2026-2027"
total_items: 10
topics:
  - name: "Cells"
    weight: 55
"#,
    )
    .unwrap();

    examforge()
        .args(["tos", "--id", "bp-1", "--db"])
        .arg(&db)
        .arg("--config")
        .arg(&bad)
        .assert()
        .failure()
        .code(2);

    examforge()
        .args(["import", "--role", "principal", "--db"])
        .arg(&db)
        .arg(dir.path().join("missing.yaml"))
        .assert()
        .failure()
        .code(2)
        .stderr(contains("unknown role"));
}

#[test]
fn generate_without_blueprint_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("bank.db");

    examforge()
        .args([
            "generate",
            "--blueprint",
            "missing",
            "--id",
            "t",
            "--title",
            "T",
            "--db",
        ])
        .arg(&db)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("not found"));
}
