//! Plain-language explanations for finalizers blocking a deletion

/// Explanation for a well-known finalizer
pub fn explain(finalizer: &str) -> Option<&'static str> {
    let text = match finalizer {
        "kubernetes" => {
            "the namespace controller is still deleting the objects inside this namespace"
        }
        "kubernetes.io/pvc-protection" => "the claim is still mounted by at least one pod",
        "kubernetes.io/pv-protection" => "the volume is still bound to a claim",
        "foregroundDeletion" => {
            "foreground deletion waits for every dependent object to be deleted first"
        }
        "orphan" => "the garbage collector is orphaning the dependents of this object",
        "customresourcecleanup.apiextensions.k8s.io" => {
            "all custom resources of this definition must be deleted first"
        }
        "service.kubernetes.io/load-balancer-cleanup" => {
            "the cloud provider is still releasing the load balancer"
        }
        "batch.kubernetes.io/job-tracking" => "the job controller has not accounted for this pod yet",
        _ => return None,
    };
    Some(text)
}

/// Human-readable description of the finalizers keeping an object alive
pub fn describe_blocking(finalizers: &[String]) -> String {
    if finalizers.is_empty() {
        return "no finalizers are set; the API server has not removed the object yet".to_string();
    }

    finalizers
        .iter()
        .map(|f| match explain(f) {
            Some(text) => format!("- {}: {}", f, text),
            None => format!(
                "- {}: set by a controller; check that it is running and healthy",
                f
            ),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
