//! MediaWiki api.php client
//!
//! Bot-password login, CSRF-token mutation, multipart file upload and
//! category listing. Timeouts are retried; API errors surface typed.

use super::{UploadOutcome, UploadRequest, WikiError, WikiRepo};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use wikivox_common::config::WikiConfig;

const USER_AGENT: &str = "wikivox/0.1 (voice pipeline bot)";
const RETRIES: usize = 3;
const RETRY_DELAY_MS: u64 = 1500;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    query: TokenQueryInner,
}

#[derive(Debug, Deserialize)]
struct TokenQueryInner {
    tokens: Tokens,
}

#[derive(Debug, Deserialize)]
struct Tokens {
    #[serde(default)]
    logintoken: Option<String>,
    #[serde(default)]
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginResult,
}

#[derive(Debug, Deserialize)]
struct LoginResult {
    result: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    query: PageQueryInner,
}

#[derive(Debug, Deserialize)]
struct PageQueryInner {
    #[serde(default)]
    pages: Vec<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    revisions: Vec<Revision>,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct Revision {
    slots: RevisionSlots,
}

#[derive(Debug, Deserialize)]
struct RevisionSlots {
    main: RevisionSlot,
}

#[derive(Debug, Deserialize)]
struct RevisionSlot {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: String,
}

#[derive(Debug, Deserialize)]
struct CategoryQuery {
    #[serde(default)]
    query: Option<CategoryQueryInner>,
    #[serde(rename = "continue", default)]
    cont: Option<CategoryContinue>,
}

#[derive(Debug, Deserialize)]
struct CategoryQueryInner {
    categorymembers: Vec<CategoryMember>,
}

#[derive(Debug, Deserialize)]
struct CategoryMember {
    title: String,
}

#[derive(Debug, Deserialize)]
struct CategoryContinue {
    cmcontinue: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    upload: Option<UploadResult>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    result: String,
    #[serde(default)]
    warnings: Option<UploadWarnings>,
}

#[derive(Debug, Deserialize)]
struct UploadWarnings {
    #[serde(default)]
    exists: Option<String>,
    #[serde(rename = "was-deleted", default)]
    was_deleted: Option<String>,
    #[serde(default)]
    duplicate: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

/// Authenticated MediaWiki client
pub struct MediaWikiClient {
    http: reqwest::Client,
    api_url: String,
    csrf_token: String,
}

impl MediaWikiClient {
    /// Connect and log in with a bot password
    pub async fn connect(config: &WikiConfig) -> Result<Self, WikiError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| WikiError::Network(e.to_string()))?;

        let mut client = Self {
            http,
            api_url: config.api_url.clone(),
            csrf_token: String::new(),
        };

        if !config.username.is_empty() {
            client.login(&config.username, &config.password).await?;
        }
        client.csrf_token = client.fetch_token("csrf").await?;
        info!(api = %config.api_url, "Connected to wiki");
        Ok(client)
    }

    async fn login(&self, username: &str, password: &str) -> Result<(), WikiError> {
        let token = self.fetch_token("login").await?;
        let params = [
            ("action", "login"),
            ("lgname", username),
            ("lgpassword", password),
            ("lgtoken", token.as_str()),
            ("format", "json"),
        ];
        let response: LoginResponse = self
            .post_form(&params)
            .await?
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;
        if response.login.result != "Success" {
            return Err(WikiError::LoginFailed(
                response.login.reason.unwrap_or(response.login.result),
            ));
        }
        Ok(())
    }

    async fn fetch_token(&self, kind: &str) -> Result<String, WikiError> {
        let params = [
            ("action", "query"),
            ("meta", "tokens"),
            ("type", kind),
            ("format", "json"),
            ("formatversion", "2"),
        ];
        let response: TokenQuery = self
            .get(&params)
            .await?
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;
        let token = match kind {
            "login" => response.query.tokens.logintoken,
            _ => response.query.tokens.csrftoken,
        };
        token.ok_or_else(|| WikiError::Api {
            code: "no-token".to_string(),
            info: format!("no {} token in response", kind),
        })
    }

    /// Send with timeout retry. The builder closure runs once per
    /// attempt: request bodies (forms, multipart) are not reusable
    /// across sends.
    async fn send_with_retry<F>(&self, build: F) -> Result<reqwest::Response, WikiError>
    where
        F: Fn() -> Result<reqwest::RequestBuilder, WikiError>,
    {
        let mut last_err = String::new();
        for attempt in 1..=RETRIES {
            match build()?.send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_timeout() && attempt < RETRIES => {
                    warn!(attempt, "Wiki request timed out, retrying");
                    last_err = e.to_string();
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
                }
                Err(e) => return Err(WikiError::Network(e.to_string())),
            }
        }
        Err(WikiError::Network(last_err))
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<reqwest::Response, WikiError> {
        self.send_with_retry(|| Ok(self.http.get(&self.api_url).query(params)))
            .await
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<reqwest::Response, WikiError> {
        self.send_with_retry(|| Ok(self.http.post(&self.api_url).form(params)))
            .await
    }

    fn classify_upload(result: UploadResult) -> Result<UploadOutcome, WikiError> {
        if result.result == "Success" {
            return Ok(UploadOutcome::Uploaded);
        }
        if let Some(warnings) = result.warnings {
            if warnings.exists.is_some() {
                return Ok(UploadOutcome::AlreadyExists);
            }
            if warnings.was_deleted.is_some() {
                return Ok(UploadOutcome::WasDeleted);
            }
            // Duplicate handling (redirect, rename) is a follow-up page
            // edit decided by the caller
            if let Some(original) = warnings.duplicate.into_iter().next() {
                return Ok(UploadOutcome::DuplicateOf(original));
            }
        }
        Err(WikiError::Api {
            code: "upload-failed".to_string(),
            info: result.result,
        })
    }
}

impl WikiRepo for MediaWikiClient {
    async fn get_page(&self, title: &str) -> Result<Option<String>, WikiError> {
        let params = [
            ("action", "query"),
            ("titles", title),
            ("prop", "revisions"),
            ("rvprop", "content"),
            ("rvslots", "main"),
            ("format", "json"),
            ("formatversion", "2"),
        ];
        let response: PageQuery = self
            .get(&params)
            .await?
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;

        let page = match response.query.pages.into_iter().next() {
            Some(p) if !p.missing => p,
            _ => return Ok(None),
        };
        Ok(page
            .revisions
            .into_iter()
            .next()
            .map(|r| r.slots.main.content))
    }

    async fn save_page(&self, title: &str, text: &str, summary: &str) -> Result<(), WikiError> {
        let params = [
            ("action", "edit"),
            ("title", title),
            ("text", text),
            ("summary", summary),
            ("bot", "1"),
            ("token", self.csrf_token.as_str()),
            ("format", "json"),
        ];
        let response = self.post_form(&params).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;
        if let Some(error) = body.get("error") {
            return Err(WikiError::Api {
                code: error["code"].as_str().unwrap_or("unknown").to_string(),
                info: error["info"].as_str().unwrap_or_default().to_string(),
            });
        }
        debug!(title, "Saved page");
        Ok(())
    }

    async fn category_files(&self, category: &str) -> Result<BTreeSet<String>, WikiError> {
        let category_title = format!("Category:{}", category);
        let mut files = BTreeSet::new();
        let mut cont: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title.clone()),
                ("cmtype", "file".to_string()),
                ("cmlimit", "500".to_string()),
                ("format", "json".to_string()),
                ("formatversion", "2".to_string()),
            ];
            if let Some(c) = &cont {
                params.push(("cmcontinue", c.clone()));
            }
            let borrowed: Vec<(&str, &str)> =
                params.iter().map(|(k, v)| (*k, v.as_str())).collect();

            let response: CategoryQuery = self
                .get(&borrowed)
                .await?
                .json()
                .await
                .map_err(|e| WikiError::Network(e.to_string()))?;

            if let Some(inner) = response.query {
                for member in inner.categorymembers {
                    // Strip the File: namespace prefix
                    let name = member
                        .title
                        .split_once(':')
                        .map(|(_, rest)| rest.to_string())
                        .unwrap_or(member.title);
                    files.insert(name);
                }
            }
            match response.cont {
                Some(c) => cont = Some(c.cmcontinue),
                None => break,
            }
        }

        debug!(category, files = files.len(), "Listed category files");
        Ok(files)
    }

    async fn upload_file(&self, request: &UploadRequest) -> Result<UploadOutcome, WikiError> {
        let bytes = tokio::fs::read(&request.local_path).await?;
        // Multipart bodies are consumed by send, so each retry attempt
        // rebuilds the form from the in-memory bytes
        let build_form = || -> Result<reqwest::RequestBuilder, WikiError> {
            let part = reqwest::multipart::Part::bytes(bytes.clone())
                .file_name(request.file_name.clone())
                .mime_str("application/ogg")
                .map_err(|e| WikiError::Network(e.to_string()))?;
            let mut form = reqwest::multipart::Form::new()
                .text("action", "upload")
                .text("filename", request.file_name.clone())
                .text("text", request.text.clone())
                .text("comment", request.comment.clone())
                .text("token", self.csrf_token.clone())
                .text("format", "json")
                .part("file", part);
            if request.ignore_warnings {
                form = form.text("ignorewarnings", "1");
            }
            Ok(self.http.post(&self.api_url).multipart(form))
        };

        let response: UploadResponse = self
            .send_with_retry(build_form)
            .await?
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;

        if let Some(error) = response.error {
            if error.code == "fileexists-no-change" {
                return Ok(UploadOutcome::AlreadyExists);
            }
            return Err(WikiError::Api {
                code: error.code,
                info: error.info,
            });
        }
        let result = response.upload.ok_or_else(|| WikiError::Api {
            code: "empty".to_string(),
            info: "upload response carried no result".to_string(),
        })?;
        Self::classify_upload(result)
    }

    async fn download_file(&self, file_name: &str, dest: &Path) -> Result<(), WikiError> {
        let title = format!("File:{}", file_name);
        let params = [
            ("action", "query"),
            ("titles", title.as_str()),
            ("prop", "imageinfo"),
            ("iiprop", "url"),
            ("format", "json"),
            ("formatversion", "2"),
        ];
        let response: PageQuery = self
            .get(&params)
            .await?
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;

        let url = response
            .query
            .pages
            .into_iter()
            .next()
            .filter(|p| !p.missing)
            .and_then(|p| p.imageinfo.into_iter().next())
            .map(|i| i.url)
            .ok_or_else(|| WikiError::FileNotFound(file_name.to_string()))?;

        let bytes = self
            .send_with_retry(|| Ok(self.http.get(&url)))
            .await?
            .bytes()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        debug!(file_name, dest = %dest.display(), "Downloaded wiki file");
        Ok(())
    }

    async fn move_page(&self, from: &str, to: &str, reason: &str) -> Result<(), WikiError> {
        let params = [
            ("action", "move"),
            ("from", from),
            ("to", to),
            ("reason", reason),
            ("movetalk", "1"),
            ("ignorewarnings", "1"),
            ("token", self.csrf_token.as_str()),
            ("format", "json"),
        ];
        let response = self.post_form(&params).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WikiError::Network(e.to_string()))?;
        if let Some(error) = body.get("error") {
            return Err(WikiError::Api {
                code: error["code"].as_str().unwrap_or("unknown").to_string(),
                info: error["info"].as_str().unwrap_or_default().to_string(),
            });
        }
        debug!(from, to, "Moved page");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_warnings_classify() {
        let exists: UploadResult = serde_json::from_str(
            r#"{"result": "Warning", "warnings": {"exists": "CN_Vo_lee_105.ogg"}}"#,
        )
        .unwrap();
        assert_eq!(
            MediaWikiClient::classify_upload(exists).unwrap(),
            UploadOutcome::AlreadyExists
        );

        let duplicate: UploadResult = serde_json::from_str(
            r#"{"result": "Warning", "warnings": {"duplicate": ["CN_Vo_old_101.ogg"]}}"#,
        )
        .unwrap();
        assert_eq!(
            MediaWikiClient::classify_upload(duplicate).unwrap(),
            UploadOutcome::DuplicateOf("CN_Vo_old_101.ogg".to_string())
        );

        let deleted: UploadResult = serde_json::from_str(
            r#"{"result": "Warning", "warnings": {"was-deleted": "x"}}"#,
        )
        .unwrap();
        assert_eq!(
            MediaWikiClient::classify_upload(deleted).unwrap(),
            UploadOutcome::WasDeleted
        );
    }

    #[tokio::test]
    async fn connection_errors_surface_as_network_errors() {
        // Nothing listens on this port; failure is immediate, not a timeout
        let client = MediaWikiClient {
            http: reqwest::Client::new(),
            api_url: "http://127.0.0.1:1/api.php".to_string(),
            csrf_token: String::new(),
        };
        let params = [("action", "query"), ("format", "json")];
        let err = client.get(&params).await.unwrap_err();
        assert!(matches!(err, WikiError::Network(_)));
    }
}
