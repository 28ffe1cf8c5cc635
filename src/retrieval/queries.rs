//! Cypher used by the graph-backed search source
//!
//! A retrieval query receives `node` and `score` from the hybrid index search
//! and must return the columns `text`, `metadata`, `score`, `embedding`,
//! `anchor_communities` and `hit_communities`.

use crate::config::Preset;

/// Routes Tag, User, Question and Answer hits to the questions they belong to
pub const STACKOVERFLOW_RETRIEVAL_QUERY: &str = r#"
WITH node, score
CALL {
  WITH node
  MATCH (q:Question) WHERE node:Question AND q = node
  RETURN q
  UNION
  WITH node
  MATCH (node:Answer)-[:ANSWERS]->(q:Question)
  RETURN q
  UNION
  WITH node
  MATCH (q:Question)-[:TAGGED]->(node:Tag)
  RETURN q
  UNION
  WITH node
  MATCH (node:User)-[:ASKED]->(q:Question)
  RETURN q
  UNION
  WITH node
  MATCH (node:User)-[:PROVIDED]->(:Answer)-[:ANSWERS]->(q:Question)
  RETURN q
}
WITH DISTINCT q AS question, node, score
OPTIONAL MATCH (asker:User)-[:ASKED]->(question)
OPTIONAL MATCH (question)-[:TAGGED]->(tag:Tag)
WITH question, node, score, asker, collect(DISTINCT tag.name) AS tags
OPTIONAL MATCH (answer:Answer)-[:ANSWERS]->(question)
OPTIONAL MATCH (provider:User)-[:PROVIDED]->(answer)
WITH question, node, score, asker, tags,
     collect(DISTINCT {
       id: answer.id,
       body: answer.body,
       score: answer.score,
       is_accepted: answer.is_accepted,
       provided_by: provider.display_name
     }) AS answers
RETURN
  'Title: ' + coalesce(question.title, '') + '\nBody: ' + coalesce(question.body, '') AS text,
  {
    id: question.id,
    title: question.title,
    link: question.link,
    score: question.score,
    creation_date: toString(question.creation_date),
    asked_by: asker.display_name,
    tags: tags,
    answers: answers,
    simscore: score
  } AS metadata,
  score,
  question.embedding AS embedding,
  coalesce(node.communityId, []) AS anchor_communities,
  coalesce(question.communityId, []) AS hit_communities
"#;

/// Routes Movie, Person, Category, Country and Type hits to movies
pub const MOVIES_RETRIEVAL_QUERY: &str = r#"
WITH node, score
OPTIONAL MATCH (node)-[:SAME_AS]->(canonical)
WITH coalesce(canonical, node) AS anchor, score
CALL {
  WITH anchor
  MATCH (m:Movie) WHERE anchor:Movie AND m = anchor
  RETURN m
  UNION
  WITH anchor
  MATCH (anchor:Person)-[:ACTED_IN|DIRECTED]->(m:Movie)
  RETURN m
  UNION
  WITH anchor
  MATCH (m:Movie)-[:IN_CATEGORY|TYPED_AS|`WHERE`]->(anchor)
  RETURN m
}
WITH DISTINCT m, anchor, score
OPTIONAL MATCH (m)-[:IN_CATEGORY]->(cat:Category)
OPTIONAL MATCH (m)-[:TYPED_AS]->(t:Type)
OPTIONAL MATCH (m)-[:`WHERE`]->(c:Country)
OPTIONAL MATCH (p:Person)-[:ACTED_IN|DIRECTED]->(m)
WITH m, anchor, score,
     collect(DISTINCT cat.name) AS categories,
     collect(DISTINCT t.type) AS types,
     collect(DISTINCT c.name) AS countries,
     collect(DISTINCT p.name) AS people
RETURN
  coalesce(m.description, m.title, '') AS text,
  {
    id: m.id,
    title: m.title,
    duration: m.duration,
    release_year: m.release_year,
    rating: m.rating,
    categories: categories,
    types: types,
    countries: countries,
    people: people,
    simscore: score
  } AS metadata,
  score,
  m.embedding AS embedding,
  coalesce(anchor.communityId, []) AS anchor_communities,
  coalesce(m.communityId, []) AS hit_communities
"#;

pub fn retrieval_query_for(preset: Preset) -> &'static str {
    match preset {
        Preset::StackOverflow => STACKOVERFLOW_RETRIEVAL_QUERY,
        Preset::Movies => MOVIES_RETRIEVAL_QUERY,
    }
}

/// Wrap a retrieval query in the hybrid index search.
///
/// Vector scores are the index's normalised cosine in [0, 1]; full-text
/// scores are divided by the best full-text hit. A node found by both keeps
/// the higher score.
pub fn hybrid_search_query(retrieval_query: &str) -> String {
    format!(
        r#"CALL {{
  CALL db.index.vector.queryNodes($index, $k, $embedding) YIELD node, score
  RETURN node, score
  UNION
  CALL db.index.fulltext.queryNodes($keyword_index, $keyword_query, {{limit: $k}}) YIELD node, score
  WITH collect({{node: node, score: score}}) AS hits, max(score) AS top
  UNWIND hits AS hit
  RETURN hit.node AS node, hit.score / top AS score
}}
WITH node, max(score) AS score
ORDER BY score DESC
LIMIT $k
{}"#,
        retrieval_query.trim()
    )
}
