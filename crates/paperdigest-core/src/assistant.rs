use crate::model::{Assistant, AssistantSpec, Tool};
use crate::service::HostedService;
use crate::{Config, CoreError};

/// Assistant parameters derived from the config, with file search enabled.
pub fn spec_from_config(config: &Config) -> AssistantSpec {
    AssistantSpec {
        model: config.model.clone(),
        name: config.assistant_name.clone(),
        instructions: config.instructions.clone(),
        tools: vec![Tool::FileSearch],
    }
}

/// Create the assistant and check that file search came back enabled.
///
/// `on_created` sees the ID before the check, so a rejected assistant can
/// still be deleted by the caller.
pub async fn create<S: HostedService>(
    service: &S,
    spec: &AssistantSpec,
    mut on_created: impl FnMut(&str),
) -> Result<Assistant, CoreError> {
    let assistant = service
        .create_assistant(spec)
        .await
        .map_err(|e| CoreError::AssistantLifecycle(format!("create failed: {e}")))?;
    on_created(&assistant.id);
    if !assistant.tools.contains(&Tool::FileSearch) {
        return Err(CoreError::AssistantLifecycle(format!(
            "assistant {} was created without file search",
            assistant.id
        )));
    }
    log::info!("created assistant {} ({})", assistant.id, assistant.model);
    Ok(assistant)
}

/// Point the assistant's file search tool at `store_id`.
pub async fn bind<S: HostedService>(
    service: &S,
    assistant_id: &str,
    store_id: &str,
) -> Result<Assistant, CoreError> {
    let assistant = service
        .bind_vector_store(assistant_id, store_id)
        .await
        .map_err(|e| CoreError::AssistantLifecycle(format!("update of {assistant_id} failed: {e}")))?;
    if !assistant.bound_stores().iter().any(|id| id == store_id) {
        return Err(CoreError::AssistantLifecycle(format!(
            "assistant {assistant_id} is not bound to {store_id} after update"
        )));
    }
    log::info!("bound vector store {} to assistant {}", store_id, assistant_id);
    Ok(assistant)
}

pub async fn delete<S: HostedService>(service: &S, assistant_id: &str) -> Result<(), CoreError> {
    let ack = service
        .delete_assistant(assistant_id)
        .await
        .map_err(|e| CoreError::AssistantLifecycle(format!("delete of {assistant_id} failed: {e}")))?;
    if !ack.deleted {
        return Err(CoreError::AssistantLifecycle(format!(
            "service did not confirm deletion of {assistant_id}"
        )));
    }
    log::info!("deleted assistant {}", assistant_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_enables_file_search() {
        let spec = spec_from_config(&Config::default());
        assert_eq!(spec.tools, vec![Tool::FileSearch]);
        assert_eq!(spec.model, "gpt-4o");
        let body = serde_json::to_value(&spec).unwrap();
        assert_eq!(body["tools"][0]["type"], "file_search");
    }
}
