#![cfg(test)]

use crate::error::Kind;
use crate::nodes::walk::walk;

use super::{root, IDENT};

#[tokio::test]
async fn missing_tail_reports_the_walked_prefix() {
    let start = root();
    let a = start.mkdir("a", 0o755, IDENT).await.unwrap();
    let b = a.mkdir("b", 0o755, IDENT).await.unwrap();

    let names: Vec<String> = ["a", "b", "c"].iter().map(ToString::to_string).collect();
    let walked = walk(&start, &names);
    assert_eq!(walked.wqids, vec![a.qid(), b.qid()]);
    assert_eq!(walked.end.unwrap_err().kind(), Kind::NotExist);
}

#[test]
fn empty_walk_clones_without_qids() {
    let start = root();
    let walked = walk(&start, &[]);
    assert!(walked.wqids.is_empty());
    assert_eq!(walked.end.unwrap().qid(), start.qid());
}

#[tokio::test]
async fn dot_clones_with_qid() {
    let start = root();
    let walked = walk(&start, &[".".to_string()]);
    assert_eq!(walked.wqids, vec![start.qid()]);
    assert_eq!(walked.end.unwrap().qid(), start.qid());
}

#[tokio::test]
async fn dotdot_walks_to_the_parent() {
    let start = root();
    let a = start.mkdir("a", 0o755, IDENT).await.unwrap();
    let walked = walk(&a, &["..".to_string()]);
    assert_eq!(walked.wqids, vec![start.qid()]);
    assert_eq!(walked.end.unwrap().qid(), start.qid());
}

#[test]
fn dotdot_at_the_root_degrades_to_dot() {
    let start = root();
    let walked = walk(&start, &["..".to_string()]);
    assert_eq!(walked.wqids, vec![start.qid()]);
    assert_eq!(walked.end.unwrap().qid(), start.qid());
}

#[tokio::test]
async fn clone_then_step_equals_step_then_clone() {
    let start = root();
    let a = start.mkdir("a", 0o755, IDENT).await.unwrap();

    let clone_first = walk(&walk(&start, &[]).end.unwrap(), &["a".to_string()]);
    let step_first = walk(&walk(&start, &["a".to_string()]).end.unwrap(), &[]);

    assert_eq!(clone_first.end.unwrap().qid(), a.qid());
    assert_eq!(step_first.end.unwrap().qid(), a.qid());
}

#[tokio::test]
async fn walking_through_a_file_is_not_dir() {
    let start = root();
    start.create("f", crate::nodes::OpenFlags::new(0), 0o644, IDENT).await.unwrap();
    let names: Vec<String> = ["f", "x"].iter().map(ToString::to_string).collect();
    let walked = walk(&start, &names);
    assert_eq!(walked.wqids.len(), 1);
    assert_eq!(walked.end.unwrap_err().kind(), Kind::NotDir);
}
