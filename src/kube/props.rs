// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::BTreeMap;

use crate::propset::PropSet;

/// Pod attributes resolved for one docker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeProps {
    pub namespace: String,
    pub pod_name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub container_name: String,
}

impl KubeProps {
    pub fn prop_set(&self) -> PropSet {
        PropSet::new()
            .add_string("kube-namespace", &self.namespace)
            .add_string("kube-pod-name", &self.pod_name)
            .add_map("kube-labels", self.labels.clone())
            .add_map("kube-annotations", self.annotations.clone())
            .add_string("kube-container-name", &self.container_name)
    }
}
