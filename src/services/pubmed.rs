//! Paper discovery through the NCBI E-utilities API.
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

use crate::dto::DiscoveredPaper;
use crate::services::{ServiceError, ServiceResult};

const ESEARCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi";
const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";
const CONTACT_EMAIL: &str = "synapse-mapper@example.com";
const MAX_AUTHORS: usize = 5;

#[derive(Debug, Deserialize)]
struct EsearchEnvelope {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Clone)]
pub struct PubMedClient {
    http: reqwest::Client,
}

impl Default for PubMedClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PubMedClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// PubMed ids matching a free-text query.
    pub async fn search(&self, query: &str, max_results: u32) -> ServiceResult<Vec<String>> {
        let response = self
            .http
            .get(ESEARCH_URL)
            .query(&[
                ("db", "pubmed"),
                ("term", query),
                ("retmax", &max_results.to_string()),
                ("retmode", "json"),
                ("email", CONTACT_EMAIL),
            ])
            .send()
            .await?
            .error_for_status()?;
        let envelope: EsearchEnvelope = response.json().await?;
        Ok(envelope.esearchresult.idlist)
    }

    /// Titles, abstracts, and authors for the given PubMed ids.
    pub async fn fetch(&self, pmids: &[String]) -> ServiceResult<Vec<DiscoveredPaper>> {
        if pmids.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .http
            .get(EFETCH_URL)
            .query(&[
                ("db", "pubmed"),
                ("id", &pmids.join(",")),
                ("retmode", "xml"),
                ("email", CONTACT_EMAIL),
            ])
            .send()
            .await?
            .error_for_status()?;
        let xml = response.text().await?;
        parse_efetch(&xml)
    }

    pub async fn discover(&self, query: &str, max_results: u32) -> ServiceResult<Vec<DiscoveredPaper>> {
        let pmids = self.search(query, max_results).await?;
        self.fetch(&pmids).await
    }
}

/// Pull the article fields out of an efetch PubmedArticleSet document.
fn parse_efetch(xml: &str) -> ServiceResult<Vec<DiscoveredPaper>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut papers = Vec::new();
    let mut current: Option<DiscoveredPaper> = None;
    let mut path: Vec<String> = Vec::new();
    let mut last_name = String::new();
    let mut fore_name = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                if name == "PubmedArticle" {
                    current = Some(DiscoveredPaper::default());
                    last_name.clear();
                    fore_name.clear();
                }
                path.push(name);
            }
            Ok(Event::End(tag)) => {
                let name = String::from_utf8_lossy(tag.name().as_ref()).to_string();
                path.pop();
                match name.as_str() {
                    "PubmedArticle" => {
                        if let Some(mut paper) = current.take() {
                            if !paper.id.is_empty() {
                                paper.url =
                                    format!("https://pubmed.ncbi.nlm.nih.gov/{}/", paper.id);
                                papers.push(paper);
                            }
                        }
                    }
                    "Author" => {
                        if let Some(paper) = current.as_mut() {
                            if paper.authors.len() < MAX_AUTHORS && !last_name.is_empty() {
                                let full = if fore_name.is_empty() {
                                    last_name.clone()
                                } else {
                                    format!("{fore_name} {last_name}")
                                };
                                paper.authors.push(full);
                            }
                        }
                        last_name.clear();
                        fore_name.clear();
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(text)) => {
                let Some(paper) = current.as_mut() else {
                    continue;
                };
                let value = text
                    .unescape()
                    .map_err(|err| ServiceError::UpstreamFormat(err.to_string()))?
                    .into_owned();
                match path.last().map(String::as_str) {
                    Some("PMID") if paper.id.is_empty() && in_path(&path, "MedlineCitation") => {
                        paper.id = value;
                    }
                    Some("ArticleTitle") => paper.title.push_str(&value),
                    Some("AbstractText") => {
                        if !paper.abstract_text.is_empty() {
                            paper.abstract_text.push(' ');
                        }
                        paper.abstract_text.push_str(&value);
                    }
                    Some("LastName") => last_name = value,
                    Some("ForeName") => fore_name = value,
                    Some("Title") if in_path(&path, "Journal") => paper.journal = value,
                    Some("Year") if in_path(&path, "PubDate") => {
                        paper.year = value.parse().ok();
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(ServiceError::UpstreamFormat(err.to_string())),
            _ => {}
        }
    }
    Ok(papers)
}

fn in_path(path: &[String], ancestor: &str) -> bool {
    path.iter().any(|segment| segment == ancestor)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
  <PubmedArticle>
    <MedlineCitation>
      <PMID Version="1">12345678</PMID>
      <Article>
        <Journal>
          <Title>Nature Medicine</Title>
          <JournalIssue>
            <PubDate><Year>2021</Year></PubDate>
          </JournalIssue>
        </Journal>
        <ArticleTitle>EGFR mutations in lung cancer.</ArticleTitle>
        <Abstract>
          <AbstractText Label="BACKGROUND">EGFR drives tumor growth.</AbstractText>
          <AbstractText Label="RESULTS">Gefitinib inhibits EGFR.</AbstractText>
        </Abstract>
        <AuthorList>
          <Author><LastName>Tanaka</LastName><ForeName>Yuki</ForeName></Author>
          <Author><LastName>Smith</LastName><ForeName>Ana</ForeName></Author>
        </AuthorList>
      </Article>
    </MedlineCitation>
  </PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn parses_article_fields() {
        let papers = parse_efetch(SAMPLE).unwrap();
        assert_eq!(papers.len(), 1);
        let paper = &papers[0];
        assert_eq!(paper.id, "12345678");
        assert_eq!(paper.title, "EGFR mutations in lung cancer.");
        assert_eq!(
            paper.abstract_text,
            "EGFR drives tumor growth. Gefitinib inhibits EGFR."
        );
        assert_eq!(paper.authors, vec!["Yuki Tanaka", "Ana Smith"]);
        assert_eq!(paper.journal, "Nature Medicine");
        assert_eq!(paper.year, Some(2021));
        assert_eq!(paper.url, "https://pubmed.ncbi.nlm.nih.gov/12345678/");
    }

    #[test]
    fn entities_in_text_are_unescaped() {
        let xml = "<PubmedArticleSet><PubmedArticle><MedlineCitation>\
                   <PMID>99</PMID><Article>\
                   <ArticleTitle>TGF-&#x3b2; &amp; EGFR crosstalk</ArticleTitle>\
                   </Article></MedlineCitation></PubmedArticle></PubmedArticleSet>";
        let papers = parse_efetch(xml).unwrap();
        assert_eq!(papers[0].title, "TGF-\u{3b2} & EGFR crosstalk");
    }

    #[test]
    fn empty_document_yields_no_papers() {
        let papers = parse_efetch("<PubmedArticleSet></PubmedArticleSet>").unwrap();
        assert!(papers.is_empty());
    }

    #[test]
    fn article_without_pmid_is_skipped() {
        let xml = "<PubmedArticleSet><PubmedArticle><MedlineCitation>\
                   <Article><ArticleTitle>Untracked</ArticleTitle></Article>\
                   </MedlineCitation></PubmedArticle></PubmedArticleSet>";
        assert!(parse_efetch(xml).unwrap().is_empty());
    }
}
