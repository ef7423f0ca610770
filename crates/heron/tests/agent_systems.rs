use anyhow::Result;
use serde_json::json;

use heron::agent::Agent;
use heron::models::message::Message;
use heron::models::tool::ToolCall;
use heron::providers::mock::MockProvider;
use heron::systems::functions::{FunctionClient, FunctionSystem};
use heron::systems::retrieval::{RetrievalConfig, RetrievalSystem, VectorSearchClient};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stand up a fake workspace serving function metadata, statement execution
/// and an index query endpoint.
async fn start_workspace() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(
            "/api/2.1/unity-catalog/functions/main.default.add_numbers",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "full_name": "main.default.add_numbers",
            "comment": "Add two numbers",
            "input_params": {
                "parameters": [
                    {"name": "number_1", "type_name": "DOUBLE"},
                    {"name": "number_2", "type_name": "DOUBLE"}
                ]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": {"state": "SUCCEEDED"},
            "result": {"data_array": [["100.0"]]}
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(
            "/api/2.0/vector-search/indexes/main.default.docs_index/query",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "manifest": {"columns": [{"name": "content"}]},
            "result": {"data_array": [["Serving endpoints host chat models."]]}
        })))
        .mount(&server)
        .await;

    server
}

async fn build_agent(server: &MockServer, provider: MockProvider) -> Result<Agent> {
    let function_client = FunctionClient::new(
        server.uri(),
        "test_token".to_string(),
        "warehouse123".to_string(),
    )?;
    let function_system = FunctionSystem::new(
        function_client,
        &["main.default.add_numbers".to_string()],
    )
    .await?;

    let vector_client = VectorSearchClient::new(server.uri(), "test_token".to_string())?;
    let retrieval_system = RetrievalSystem::new(
        vector_client,
        RetrievalConfig::new("main.default.docs_index")
            .with_tool("search_docs", "Retrieves documentation snippets")
            .with_num_results(1),
    );

    let mut agent = Agent::new(Box::new(provider));
    agent.add_system(Box::new(function_system));
    agent.add_system(Box::new(retrieval_system));
    Ok(agent)
}

#[tokio::test]
async fn test_agent_calls_catalog_function_end_to_end() -> Result<()> {
    let server = start_workspace().await;

    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request(
            "t1",
            Ok(ToolCall::new(
                "functions__main_default_add_numbers",
                json!({"number_1": 42, "number_2": 58}),
            )),
        ),
        Message::assistant().with_text("The sum is 100."),
    ]);
    let calls = provider.call_counter();
    let agent = build_agent(&server, provider).await?;

    let conversation = agent
        .run(&[Message::user().with_text("What is 42 + 58?")])
        .await?;

    assert_eq!(conversation.len(), 4);
    let response = conversation[2].content[0].as_tool_response().unwrap();
    assert_eq!(response.id, "t1");
    assert_eq!(
        response.tool_result.as_ref().unwrap()[0].as_text(),
        Some("100.0")
    );
    assert_eq!(conversation[3].text(), "The sum is 100.");
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn test_agent_retrieves_then_answers() -> Result<()> {
    let server = start_workspace().await;

    let provider = MockProvider::new(vec![
        Message::assistant().with_tool_request(
            "r1",
            Ok(ToolCall::new(
                "retrieval__search_docs",
                json!({"query": "what hosts chat models"}),
            )),
        ),
        Message::assistant().with_text("Serving endpoints host chat models."),
    ]);
    let agent = build_agent(&server, provider).await?;

    let conversation = agent
        .run(&[Message::user().with_text("What hosts chat models?")])
        .await?;

    assert_eq!(conversation.len(), 4);
    let response = conversation[2].content[0].as_tool_response().unwrap();
    assert_eq!(response.id, "r1");
    let row = response.tool_result.as_ref().unwrap()[0].as_data().unwrap();
    assert_eq!(row["content"], "Serving endpoints host chat models.");

    Ok(())
}

#[tokio::test]
async fn test_agent_advertises_both_systems() -> Result<()> {
    let server = start_workspace().await;
    let provider = MockProvider::new(vec![Message::assistant().with_text("hi")]);
    let agent = build_agent(&server, provider).await?;

    // One descriptor per catalog function plus one retriever tool, all
    // namespaced by their system
    let messages = agent.run(&[Message::user().with_text("hello")]).await?;
    assert_eq!(messages.len(), 2);

    Ok(())
}
